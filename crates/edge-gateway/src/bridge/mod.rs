//! Session bridges.
//!
//! Each backend protocol gets an adapter that turns a [`VerificationResult`]
//! into the credential that protocol understands, and every failure into that
//! protocol's denial. Failures are logged here, once, with their specific kind.
//!
//! | Bridge | Credential | Used by |
//! |---|---|---|
//! | [`ClaimsBridge`] | [`Principal`] | `GET /api/v1/me` |
//! | [`CookieBridge`] | [`CookieGrant`] | `/auth-sign-in` |
//! | [`TrustFlagBridge`] | `bool` | `/login` |
//! | [`TunnelBridge`] | `Result<(), AuthenticationError>` | `/websockify` |

pub mod claims;
pub mod cookie;
pub mod trust;
pub mod tunnel;

pub use claims::{ClaimsBridge, Principal};
pub use cookie::{CookieBridge, CookieError, CookieGrant, CookieSettings, SessionCookie};
pub use trust::TrustFlagBridge;
pub use tunnel::{AuthenticationError, TunnelBridge};

use crate::auth::failure::Severity;
use crate::auth::verifier::VerificationResult;
use crate::observability::metrics;

/// Adapts a verification outcome to one backend protocol.
pub trait SessionBridge {
    /// What the backend receives.
    type Credential;

    /// Name used in logs and metrics.
    fn backend(&self) -> &'static str;

    /// Turn `result` into this backend's credential or denial.
    fn bridge(&self, result: VerificationResult) -> Self::Credential;
}

/// Log and count the outcome of a bridge.
///
/// Missing and malformed tokens are logged at warn, everything else at error.
pub(crate) fn record_outcome(backend: &'static str, result: &VerificationResult) {
    match result {
        Ok(_) => {
            tracing::debug!(target: "edge.bridge", backend, "Request authenticated");
            metrics::record_auth_outcome(backend, "authenticated");
        }
        Err(failure) => {
            match failure.severity() {
                Severity::Warn => tracing::warn!(
                    target: "edge.bridge",
                    backend,
                    failure = failure.as_str(),
                    "Request denied: {failure}"
                ),
                Severity::Error => tracing::error!(
                    target: "edge.bridge",
                    backend,
                    failure = failure.as_str(),
                    "Request denied: {failure}"
                ),
            }
            metrics::record_auth_outcome(backend, failure.as_str());
        }
    }
}
