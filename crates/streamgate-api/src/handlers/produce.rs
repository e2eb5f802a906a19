//! Message produce endpoint

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use streamgate_core::PublishError;

use crate::{models::*, AppState};

/// Status code for a failed publish. Bodies are always empty.
fn status_for(err: &PublishError) -> StatusCode {
    match err {
        PublishError::Validation(_) => StatusCode::BAD_REQUEST,
        PublishError::HandleAcquisition { .. } | PublishError::Send { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/pulsar/tenants/{tenant}/namespaces/{namespace}/topics/{topic}/produce",
    params(
        ("tenant" = String, Path, description = "Tenant name"),
        ("namespace" = String, Path, description = "Namespace name"),
        ("topic" = String, Path, description = "Logical topic name")
    ),
    request_body = ProduceMsgRequest,
    responses(
        (status = 200, description = "Message produced", body = ProduceMsgResponse),
        (status = 400, description = "Empty message"),
        (status = 500, description = "Producer unavailable or send failed")
    ),
    tag = "produce"
)]
pub async fn produce(
    State(state): State<AppState>,
    Path((tenant, namespace, topic)): Path<(String, String, String)>,
    Json(req): Json<ProduceMsgRequest>,
) -> Result<Json<ProduceMsgResponse>, StatusCode> {
    match state
        .publisher
        .publish(&tenant, &namespace, &topic, req.msg)
        .await
    {
        Ok(outcome) => Ok(Json(ProduceMsgResponse {
            cost_time: outcome.elapsed_millis,
        })),
        Err(e) => {
            tracing::error!(
                "produce failed: tenant={}, namespace={}, topic={}, kind={}, err={}",
                tenant,
                namespace,
                topic,
                e.kind(),
                e
            );
            Err(status_for(&e))
        }
    }
}
