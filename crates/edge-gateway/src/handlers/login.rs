//! Trust-flag login endpoint.

use crate::auth::headers::OidcHeaders;
use crate::bridge::trust::safe_redirect;
use crate::bridge::{SessionBridge, TrustFlagBridge};
use crate::errors::GatewayError;
use crate::routes::AppState;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

/// Handler for GET /login
///
/// A trusted request is redirected to `next` when it stays under the
/// configured base URL, otherwise to the base URL itself.
#[tracing::instrument(skip_all, name = "edge.handlers.login")]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    headers: OidcHeaders,
) -> Response {
    let result = state.authenticator.authenticate(&headers).await;
    if !TrustFlagBridge.bridge(result) {
        return GatewayError::Unauthenticated.into_response();
    }

    let target = safe_redirect(query.next.as_deref(), &state.config.login_base_url);
    (StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response()
}
