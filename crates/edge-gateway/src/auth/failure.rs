//! Verification failure taxonomy.
//!
//! Every way a request can fail authentication maps to exactly one
//! [`AuthFailure`] variant. All variants deny; the kind only decides the log
//! severity and the metric label, so diagnostics survive even though every
//! front end presents the same denied outcome.

use thiserror::Error;

/// Log severity assigned to a failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected or benign (no token, garbage token).
    Warn,
    /// Possible attack or misconfiguration.
    Error,
}

/// Reason a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AuthFailure {
    #[error("no identity token in request")]
    MissingToken,

    #[error("identity token is malformed")]
    MalformedToken,

    #[error("key distribution endpoint does not know the token's key id")]
    UnknownKey,

    #[error("failed to fetch signing key")]
    KeyFetchFailed,

    #[error("identity token signature is invalid")]
    InvalidSignature,

    #[error("identity token has expired")]
    ExpiredToken,

    #[error("token subject does not match identity header")]
    SubjectMismatch,

    #[error("identity is not the one bound to this container")]
    ContainerIdentityMismatch,
}

impl AuthFailure {
    /// Severity used when this failure is logged.
    pub fn severity(self) -> Severity {
        match self {
            AuthFailure::MissingToken | AuthFailure::MalformedToken => Severity::Warn,
            AuthFailure::UnknownKey
            | AuthFailure::KeyFetchFailed
            | AuthFailure::InvalidSignature
            | AuthFailure::ExpiredToken
            | AuthFailure::SubjectMismatch
            | AuthFailure::ContainerIdentityMismatch => Severity::Error,
        }
    }

    /// Stable, low-cardinality label for metrics and structured logs.
    pub fn as_str(self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::MalformedToken => "malformed_token",
            AuthFailure::UnknownKey => "unknown_key",
            AuthFailure::KeyFetchFailed => "key_fetch_failed",
            AuthFailure::InvalidSignature => "invalid_signature",
            AuthFailure::ExpiredToken => "expired_token",
            AuthFailure::SubjectMismatch => "subject_mismatch",
            AuthFailure::ContainerIdentityMismatch => "container_identity_mismatch",
        }
    }
}

impl From<common::jwt::JwtValidationError> for AuthFailure {
    fn from(_: common::jwt::JwtValidationError) -> Self {
        AuthFailure::MalformedToken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::jwt::JwtValidationError;

    #[test]
    fn test_benign_failures_are_warnings() {
        assert_eq!(AuthFailure::MissingToken.severity(), Severity::Warn);
        assert_eq!(AuthFailure::MalformedToken.severity(), Severity::Warn);
    }

    #[test]
    fn test_crypto_and_identity_failures_are_errors() {
        for failure in [
            AuthFailure::UnknownKey,
            AuthFailure::KeyFetchFailed,
            AuthFailure::InvalidSignature,
            AuthFailure::ExpiredToken,
            AuthFailure::SubjectMismatch,
            AuthFailure::ContainerIdentityMismatch,
        ] {
            assert_eq!(failure.severity(), Severity::Error, "{failure:?}");
        }
    }

    #[test]
    fn test_header_errors_map_to_malformed() {
        for err in [
            JwtValidationError::TokenTooLarge,
            JwtValidationError::MalformedToken,
            JwtValidationError::MissingKid,
            JwtValidationError::InvalidKid,
        ] {
            assert_eq!(AuthFailure::from(err), AuthFailure::MalformedToken);
        }
    }

    #[test]
    fn test_labels_are_unique() {
        let labels = [
            AuthFailure::MissingToken,
            AuthFailure::MalformedToken,
            AuthFailure::UnknownKey,
            AuthFailure::KeyFetchFailed,
            AuthFailure::InvalidSignature,
            AuthFailure::ExpiredToken,
            AuthFailure::SubjectMismatch,
            AuthFailure::ContainerIdentityMismatch,
        ]
        .map(AuthFailure::as_str);
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
