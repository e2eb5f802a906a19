//! Streamgate HTTP API
//!
//! HTTP front end of the proxy: accepts produce requests for a logical topic
//! and hands them to the [`Publisher`].

use axum::{
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use streamgate_core::Publisher;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub mod handlers;
pub mod models;
pub mod shutdown;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<Publisher>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/pulsar/tenants/:tenant/namespaces/:namespace/topics/:topic/produce",
            post(handlers::produce::produce),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/live", get(handlers::health::liveness_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route(
            "/metrics",
            get(streamgate_observability::exporter::metrics_handler),
        )
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// OpenAPI specification
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::produce::produce,
        handlers::health::health_check,
        handlers::health::liveness_check,
        handlers::health::readiness_check,
    ),
    components(schemas(
        models::ProduceMsgRequest,
        models::ProduceMsgResponse,
        models::HealthResponse,
        models::ReadyResponse,
    )),
    tags(
        (name = "produce", description = "Message production"),
        (name = "health", description = "Health checks"),
    ),
    info(
        title = "Streamgate API",
        version = "0.1.0",
        description = "HTTP publish proxy for pub/sub brokers"
    )
)]
pub struct ApiDoc;
