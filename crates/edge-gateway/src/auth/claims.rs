//! Claims carried by a verified identity token.
//!
//! The `sub` field and the free-form claims (email, name, ...) are personal
//! data, so both are redacted in Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of a load-balancer identity token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcClaims {
    /// Subject identifier asserted by the identity provider - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issuer of the upstream identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Every other claim the provider forwarded (email, name, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for OidcClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iss", &self.iss)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl OidcClaims {
    /// Whether `exp` is at or before `now` (Unix epoch seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }

    /// A string-valued extra claim, if present.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(serde_json::Value::as_str)
    }
}

/// Successful outcome of verification: the subject plus everything the token said.
#[derive(Clone, PartialEq)]
pub struct VerifiedIdentity {
    /// Subject, equal to both the token's `sub` and the identity header.
    pub subject: String,

    /// Key identifier the token was verified with.
    pub key_id: String,

    /// Full claim set.
    pub claims: OidcClaims,
}

impl fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedIdentity")
            .field("subject", &"[REDACTED]")
            .field("key_id", &self.key_id)
            .field("claims", &self.claims)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn alb_payload() -> &'static str {
        r#"{
            "sub": "9f1c2d3e-user",
            "exp": 1700000000,
            "iss": "https://idp.example.com",
            "email": "alice@example.com",
            "email_verified": "true",
            "name": "Alice"
        }"#
    }

    #[test]
    fn test_deserialize_alb_payload() {
        let claims: OidcClaims = serde_json::from_str(alb_payload()).unwrap();

        assert_eq!(claims.sub, "9f1c2d3e-user");
        assert_eq!(claims.exp, 1_700_000_000);
        assert_eq!(claims.iss.as_deref(), Some("https://idp.example.com"));
        assert_eq!(claims.claim_str("email"), Some("alice@example.com"));
        assert_eq!(claims.claim_str("name"), Some("Alice"));
        assert!(claims.claim_str("missing").is_none());
    }

    #[test]
    fn test_debug_redacts_personal_data() {
        let claims: OidcClaims = serde_json::from_str(alb_payload()).unwrap();
        let identity = VerifiedIdentity {
            subject: claims.sub.clone(),
            key_id: "kid-1".to_string(),
            claims,
        };

        let debug_str = format!("{identity:?}");
        assert!(!debug_str.contains("9f1c2d3e-user"));
        assert!(!debug_str.contains("alice@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("kid-1"));
    }

    #[test]
    fn test_serialize_flattens_extra_claims() {
        let claims: OidcClaims = serde_json::from_str(alb_payload()).unwrap();
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["sub"], "9f1c2d3e-user");
        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn test_is_expired_at() {
        let claims: OidcClaims = serde_json::from_str(alb_payload()).unwrap();
        assert!(!claims.is_expired_at(1_699_999_999));
        assert!(claims.is_expired_at(1_700_000_000));
    }

    #[test]
    fn test_missing_sub_is_rejected() {
        let result: Result<OidcClaims, _> = serde_json::from_str(r#"{"exp": 1}"#);
        assert!(result.is_err());
    }
}
