//! API models for REST endpoints

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of a produce request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProduceMsgRequest {
    /// Message payload; must not be empty
    #[serde(default)]
    pub msg: String,
}

/// Body of a successful produce response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProduceMsgResponse {
    /// Milliseconds spent handling the request
    #[serde(rename = "costTime")]
    pub cost_time: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadyResponse {
    pub status: String,
    /// Producer handles currently cached
    pub cached_handles: u64,
}
