//! Pass-through bridge for backends that take OIDC claims directly.

use super::{record_outcome, SessionBridge};
use crate::auth::claims::{OidcClaims, VerifiedIdentity};
use crate::auth::verifier::VerificationResult;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// The authenticated principal, or nobody.
///
/// Serialises to the full claim set when authenticated and to `{}` when
/// anonymous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Principal {
    identity: Option<VerifiedIdentity>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn subject(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.subject.as_str())
    }

    pub fn claims(&self) -> Option<&OidcClaims> {
        self.identity.as_ref().map(|i| &i.claims)
    }
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.identity {
            Some(identity) => identity.claims.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Yields a [`Principal`]; failures become the anonymous principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimsBridge;

impl SessionBridge for ClaimsBridge {
    type Credential = Principal;

    fn backend(&self) -> &'static str {
        "claims"
    }

    fn bridge(&self, result: VerificationResult) -> Principal {
        record_outcome(self.backend(), &result);
        Principal {
            identity: result.ok(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::failure::AuthFailure;

    fn identity() -> VerifiedIdentity {
        let claims: OidcClaims = serde_json::from_value(serde_json::json!({
            "sub": "alice",
            "exp": 4_102_444_800_i64,
            "email": "alice@example.com"
        }))
        .unwrap();
        VerifiedIdentity {
            subject: "alice".to_string(),
            key_id: "kid-1".to_string(),
            claims,
        }
    }

    #[test]
    fn test_success_passes_claims_through() {
        let principal = ClaimsBridge.bridge(Ok(identity()));

        assert!(principal.is_authenticated());
        assert_eq!(principal.subject(), Some("alice"));

        let json = serde_json::to_value(&principal).unwrap();
        assert_eq!(json["sub"], "alice");
        assert_eq!(json["email"], "alice@example.com");
    }

    #[test]
    fn test_every_failure_is_anonymous() {
        for failure in [
            AuthFailure::MissingToken,
            AuthFailure::MalformedToken,
            AuthFailure::InvalidSignature,
            AuthFailure::ContainerIdentityMismatch,
        ] {
            let principal = ClaimsBridge.bridge(Err(failure));

            assert!(!principal.is_authenticated());
            assert_eq!(serde_json::to_string(&principal).unwrap(), "{}");
        }
    }
}
