//! Logout endpoint.

use crate::routes::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use std::sync::Arc;

/// Handler for GET|POST /auth-sign-out
///
/// Clears the bridged cookies (and the load balancer's session cookie when
/// configured) and redirects to the external logout URL. Verification state
/// is left alone.
#[tracing::instrument(skip_all, name = "edge.handlers.sign_out")]
pub async fn sign_out(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut cookies = state.cookie_bridge.clearing_cookies();
    if let Some(alb_cookie) = &state.config.alb_session_cookie {
        cookies.push(format!(
            "{alb_cookie}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
        ));
    }

    tracing::info!(target: "edge.handlers.sign_out", "Signing out");

    (
        StatusCode::FOUND,
        [(header::LOCATION, state.config.logout_url.clone())],
        AppendHeaders(cookies.into_iter().map(|c| (header::SET_COOKIE, c))),
    )
}
