//! Denial bridge for tunnelled, non-HTTP protocols.
//!
//! Success lets the connection proceed. Failure produces an
//! [`AuthenticationError`] that the transport must turn into a rejection
//! before any tunnelled byte is forwarded.

use super::{record_outcome, SessionBridge};
use crate::auth::failure::AuthFailure;
use crate::auth::verifier::VerificationResult;
use crate::errors::WWW_AUTHENTICATE_CHALLENGE;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Structured denial carrying an HTTP status and response headers.
#[derive(Debug, Clone, Error)]
#[error("authentication failed with status {status}")]
pub struct AuthenticationError {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl AuthenticationError {
    /// Denial for `failure`.
    ///
    /// A missing token is a 401 with a challenge, so a client can tell it
    /// has not authenticated; every other failure is a plain 403.
    pub fn for_failure(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::MissingToken => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(WWW_AUTHENTICATE_CHALLENGE),
                );
                Self {
                    status: StatusCode::UNAUTHORIZED,
                    headers,
                }
            }
            _ => Self {
                status: StatusCode::FORBIDDEN,
                headers: HeaderMap::new(),
            },
        }
    }
}

impl IntoResponse for AuthenticationError {
    fn into_response(self) -> Response {
        let reason = self.status.canonical_reason().unwrap_or("Denied");
        (self.status, self.headers, reason).into_response()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TunnelBridge;

impl SessionBridge for TunnelBridge {
    type Credential = Result<(), AuthenticationError>;

    fn backend(&self) -> &'static str {
        "tunnel"
    }

    fn bridge(&self, result: VerificationResult) -> Result<(), AuthenticationError> {
        record_outcome(self.backend(), &result);
        result
            .map(|_| ())
            .map_err(AuthenticationError::for_failure)
    }
}
