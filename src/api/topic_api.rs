//! Topic-management REST API (C9)
//!
//! Implements the `/api/v1/clusters/{cluster_id}/topics/*` surface §6
//! describes, plus `/api/v1/clusters/{cluster_id}/info` and the standalone
//! `/api/v1/health` liveness probe. Every mutating call reads the optional
//! `X-User-ID` header and threads it through to `TopicService` for audit
//! attribution. Errors use `KafkaOpsError::to_topic_api_response`, a
//! distinct wire shape from the marketplace API's.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::KafkaOpsError;
use crate::topics::{TopicSpec, TopicSummary};

use super::AppState;

const MIN_CLUSTER_ID_LEN: usize = 2;

/// Wraps `KafkaOpsError` for the topic API's `{success:false, error_code,
/// ...}` response shape, distinct from the marketplace API's `ApiError`.
pub struct TopicApiError(KafkaOpsError);

impl From<KafkaOpsError> for TopicApiError {
    fn from(e: KafkaOpsError) -> Self {
        Self(e)
    }
}

impl axum::response::IntoResponse for TopicApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_topic_api_response(false))).into_response()
    }
}

type ApiResult<T> = Result<T, TopicApiError>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/clusters/:cluster_id/topics", post(create_topic).get(list_topics))
        .route("/api/v1/clusters/:cluster_id/topics/bulk", post(bulk_topics))
        .route(
            "/api/v1/clusters/:cluster_id/topics/:name",
            get(describe_topic).delete(delete_topic),
        )
        .route("/api/v1/clusters/:cluster_id/topics/:name/config", put(update_topic_config))
        .route("/api/v1/clusters/:cluster_id/topics/:name/purge", post(purge_topic))
        .route("/api/v1/clusters/:cluster_id/info", get(cluster_info))
        .route("/api/v1/health", get(health))
}

fn require_cluster_id(cluster_id: &str) -> ApiResult<()> {
    if cluster_id.len() < MIN_CLUSTER_ID_LEN {
        return Err(KafkaOpsError::validation(
            format!("cluster_id must be at least {MIN_CLUSTER_ID_LEN} characters"),
            Some("cluster_id"),
        )
        .into());
    }
    Ok(())
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers.get("X-User-ID").and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn create_topic(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    headers: HeaderMap,
    Json(spec): Json<TopicSpec>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_cluster_id(&cluster_id)?;
    let user = user_id(&headers);
    let result = state.topics.create_topic(&cluster_id, &spec, user.as_deref()).await?;
    let status = if result.success { StatusCode::CREATED } else { StatusCode::CONFLICT };
    Ok((status, Json(serde_json::to_value(result).unwrap_or(Value::Null))))
}

#[derive(Debug, Deserialize)]
struct ListTopicsQuery {
    #[serde(default)]
    include_internal: bool,
}

async fn list_topics(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Query(query): Query<ListTopicsQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_cluster_id(&cluster_id)?;
    let user = user_id(&headers);
    let topics: Vec<TopicSummary> = state.topics.list_topics(&cluster_id, query.include_internal, user.as_deref()).await?;
    Ok(Json(json!({"success": true, "topics": topics})))
}

async fn describe_topic(
    State(state): State<AppState>,
    Path((cluster_id, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_cluster_id(&cluster_id)?;
    let user = user_id(&headers);
    match state.topics.describe_topic(&cluster_id, &name, user.as_deref()).await? {
        Some(description) => Ok(Json(json!({"success": true, "topic": description}))),
        None => Err(KafkaOpsError::topic_not_found(&name).into()),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateConfigRequest {
    configs: HashMap<String, String>,
}

async fn update_topic_config(
    State(state): State<AppState>,
    Path((cluster_id, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<UpdateConfigRequest>,
) -> ApiResult<Json<Value>> {
    require_cluster_id(&cluster_id)?;
    let user = user_id(&headers);
    let result = state.topics.update_topic_config(&cluster_id, &name, &request.configs, user.as_deref()).await?;
    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}

async fn delete_topic(
    State(state): State<AppState>,
    Path((cluster_id, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_cluster_id(&cluster_id)?;
    let user = user_id(&headers);
    let result = state.topics.delete_topic(&cluster_id, &name, user.as_deref()).await?;
    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
struct PurgeRequest {
    retention_ms: i64,
}

async fn purge_topic(
    State(state): State<AppState>,
    Path((cluster_id, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<PurgeRequest>,
) -> ApiResult<Json<Value>> {
    require_cluster_id(&cluster_id)?;
    let user = user_id(&headers);
    let result = state.topics.purge_topic(&cluster_id, &name, request.retention_ms, user.as_deref()).await?;
    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BulkOperation {
    Create,
    Delete,
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    operation: BulkOperation,
    #[serde(default)]
    topics: Vec<TopicSpec>,
    #[serde(default)]
    topic_names: Vec<String>,
}

async fn bulk_topics(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<BulkRequest>,
) -> ApiResult<Json<Value>> {
    require_cluster_id(&cluster_id)?;
    let user = user_id(&headers);
    let results = match request.operation {
        BulkOperation::Create => state.topics.bulk_create_topics(&cluster_id, &request.topics, user.as_deref()).await?,
        BulkOperation::Delete => state.topics.bulk_delete_topics(&cluster_id, &request.topic_names, user.as_deref()).await?,
    };
    Ok(Json(json!({"success": true, "results": results})))
}

async fn cluster_info(State(state): State<AppState>, Path(cluster_id): Path<String>) -> ApiResult<Json<Value>> {
    require_cluster_id(&cluster_id)?;
    let info = state.topics.get_cluster_info(&cluster_id).await?;
    Ok(Json(json!({"success": true, "cluster": info})))
}

async fn health() -> Json<Value> {
    Json(json!({"success": true, "status": "ok"}))
}
