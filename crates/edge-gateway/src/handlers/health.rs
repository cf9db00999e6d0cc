//! Liveness endpoint.

use axum::Json;
use serde::{Deserialize, Serialize};

/// Body of `GET /ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
}

/// Handler for GET /ping
///
/// Always `{"status": "success"}` while the process is serving.
#[tracing::instrument(skip_all, name = "edge.handlers.ping")]
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "success".to_string(),
    })
}
