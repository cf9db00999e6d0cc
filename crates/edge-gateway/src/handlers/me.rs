//! Claims pass-through endpoint.

use crate::auth::headers::OidcHeaders;
use crate::bridge::{ClaimsBridge, Principal, SessionBridge};
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Handler for GET /api/v1/me
///
/// Returns the verified claim set, or `{}` when the request is not
/// authenticated. Never fails.
#[tracing::instrument(skip_all, name = "edge.handlers.me")]
pub async fn get_me(State(state): State<Arc<AppState>>, headers: OidcHeaders) -> Json<Principal> {
    let result = state.authenticator.authenticate(&headers).await;
    Json(ClaimsBridge.bridge(result))
}
