//! API adapters (C9)
//!
//! Two HTTP surfaces share one `AppState`: a service-broker-shaped
//! marketplace API (`marketplace.rs`) and a topic-management REST API
//! (`topic_api.rs`). Grounded on the axum/tower/tower-http/hyper stack
//! already declared in this crate's dependency table (never exercised by
//! the teacher itself) and on the handler/router idiom from the pack's
//! other `axum`-based services.

pub mod marketplace;
pub mod topic_api;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::KafkaOpsError;
use crate::orchestrator::ProvisioningOrchestrator;
use crate::scheduler::SchedulerService;
use crate::storage::MetadataStore;
use crate::topics::TopicService;

#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<dyn MetadataStore>,
    pub orchestrator: Arc<ProvisioningOrchestrator>,
    pub topics: Arc<TopicService>,
    pub scheduler: Arc<SchedulerService>,
    pub version: String,
}

/// Wraps `KafkaOpsError` so this crate's transport-agnostic error type can
/// convert straight into an axum response at every handler's `?`.
pub struct ApiError(pub KafkaOpsError);

impl From<KafkaOpsError> for ApiError {
    fn from(e: KafkaOpsError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_body(&self) -> (StatusCode, Json<serde_json::Value>) {
        let status = StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_response(false)))
    }

    /// Converts to the `(StatusCode, Json<Value>)` tuple handlers that
    /// already return a bespoke error shape on other branches use to stay
    /// uniform.
    pub fn into_status_body(self) -> (StatusCode, Json<serde_json::Value>) {
        self.status_and_body()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, body).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(marketplace::router())
        .merge(topic_api::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
