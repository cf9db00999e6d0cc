//! Cookie-bridging sign-in endpoint.

use crate::auth::headers::OidcHeaders;
use crate::bridge::{CookieGrant, SessionBridge};
use crate::routes::AppState;
use axum::extract::State;
use std::sync::Arc;

/// Handler for GET|POST /auth-sign-in
///
/// On success sets the bridged session cookie and a fresh `csrf-token`
/// cookie, then redirects to the configured landing page. On failure
/// responds 401 without setting any cookie.
#[tracing::instrument(skip_all, name = "edge.handlers.sign_in")]
pub async fn sign_in(State(state): State<Arc<AppState>>, headers: OidcHeaders) -> CookieGrant {
    let result = state.authenticator.authenticate(&headers).await;
    state.cookie_bridge.bridge(result)
}
