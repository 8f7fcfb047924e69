//! Service-broker-shaped marketplace API (C9)
//!
//! Implements the catalog/provision/deprovision/last-operation surface §6
//! describes: `/v2/catalog`, `/v2/service_instances/{id}` (PUT/DELETE/PATCH),
//! `/v2/service_instances/{id}/last_operation`, and the unsupported binding
//! routes. Service bindings and plan updates are out of scope and always
//! answer `422 NotSupported`.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::storage::ClusterStatus;

use super::{ApiError, AppState};

const KNOWN_SERVICE_ID: &str = "kafka-service";
const KNOWN_PLANS: [&str; 3] = ["basic", "standard", "premium"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v2/catalog", get(catalog))
        .route("/v2/service_instances/:id", put(provision).delete(deprovision).patch(update_not_supported))
        .route("/v2/service_instances/:id/last_operation", get(last_operation))
        .route(
            "/v2/service_instances/:id/service_bindings/:binding_id",
            put(binding_not_supported).delete(binding_not_supported),
        )
        .route("/health", get(health))
}

async fn catalog() -> Json<Value> {
    Json(json!({
        "services": [{
            "id": KNOWN_SERVICE_ID,
            "name": "kafka-service",
            "description": "Provisions and manages Kafka clusters",
            "bindable": true,
            "plan_updateable": false,
            "plans": KNOWN_PLANS,
            "tags": ["kafka", "streaming", "messaging"],
        }]
    }))
}

#[derive(Debug, Deserialize)]
struct ProvisionRequest {
    service_id: String,
    plan_id: String,
    organization_guid: String,
    space_guid: String,
    #[serde(default)]
    parameters: HashMap<String, Value>,
}

async fn provision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if request.service_id != KNOWN_SERVICE_ID {
        return Err(bad_request(format!("unknown service_id '{}'", request.service_id)));
    }
    if !KNOWN_PLANS.contains(&request.plan_id.as_str()) {
        return Err(bad_request(format!("unknown plan_id '{}'", request.plan_id)));
    }

    let config = state.orchestrator.preview_cluster_config(&request.plan_id, &request.parameters);
    if let Err(e) = config.validate() {
        return Err(bad_request(e.message));
    }

    let result = state
        .orchestrator
        .provision_cluster(
            &instance_id,
            &request.service_id,
            &request.plan_id,
            &request.organization_guid,
            &request.space_guid,
            request.parameters,
            None,
        )
        .await
        .map_err(|e| ApiError::from(e).into_status_body())?;

    if result.status == crate::providers::ProvisioningStatus::Succeeded {
        return Ok((StatusCode::CREATED, Json(json!({}))));
    }

    let message = result.error_message.unwrap_or_default();
    if message.contains("already exists") {
        return Err((StatusCode::CONFLICT, Json(json!({"error": "Conflict", "description": message}))));
    }

    Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "InternalError", "description": message}))))
}

#[derive(Debug, Deserialize)]
struct ServiceInstanceQuery {
    #[allow(dead_code)]
    service_id: Option<String>,
    #[allow(dead_code)]
    plan_id: Option<String>,
}

async fn deprovision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<ServiceInstanceQuery>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if query.service_id.is_none() || query.plan_id.is_none() {
        return Err(bad_request("service_id and plan_id query parameters are required"));
    }

    let exists = state
        .metadata
        .instance_exists(&instance_id)
        .await
        .map_err(|e| ApiError::from(e).into_status_body())?;
    if !exists {
        return Err((StatusCode::GONE, Json(json!({"error": "Gone", "description": format!("instance {instance_id} not found")}))));
    }

    state.orchestrator.deprovision_cluster(&instance_id, None).await.map_err(|e| ApiError::from(e).into_status_body())?;

    Ok((StatusCode::OK, Json(json!({}))))
}

#[derive(Debug, Serialize)]
struct LastOperationResponse {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(_query): Query<ServiceInstanceQuery>,
) -> Result<Json<LastOperationResponse>, (StatusCode, Json<Value>)> {
    let status = state.orchestrator.get_cluster_status(&instance_id).await.map_err(|e| ApiError::from(e).into_status_body())?;

    let Some(status) = status else {
        return Err((StatusCode::GONE, Json(json!({"error": "Gone", "description": format!("instance {instance_id} not found")}))));
    };

    let state_str = match status {
        ClusterStatus::Creating | ClusterStatus::Stopping => "in progress",
        ClusterStatus::Running => "succeeded",
        ClusterStatus::Error => "failed",
        ClusterStatus::Pending | ClusterStatus::Stopped => "in progress",
    };

    Ok(Json(LastOperationResponse { state: state_str, description: None }))
}

async fn update_not_supported() -> (StatusCode, Json<Value>) {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "NotSupported", "description": "plan updates are not supported"})))
}

async fn binding_not_supported() -> (StatusCode, Json<Value>) {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "NotSupported", "description": "service bindings are not supported"})))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"status": "ok", "service": "kafka-ops-agent", "version": state.version}))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "BadRequest", "description": message.into()})))
}
