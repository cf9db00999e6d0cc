//! Builder patterns for test data construction
//!
//! Produces tokens shaped like the load balancer's `x-amzn-oidc-data` header.

use crate::crypto_fixtures::TestSigningKey;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for signed load-balancer identity tokens.
///
/// # Example
/// ```rust,ignore
/// let token = AlbTokenBuilder::new()
///     .for_subject("alice")
///     .with_claim("email", "alice@example.com")
///     .expires_in(300)
///     .sign(&key);
/// ```
pub struct AlbTokenBuilder {
    sub: String,
    exp: i64,
    claims: Map<String, Value>,
    alg: String,
    kid: Option<Option<String>>,
    signer: Option<String>,
    padded: bool,
}

impl AlbTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        Self {
            sub: "test-subject".to_string(),
            exp: (Utc::now() + Duration::seconds(3600)).timestamp(),
            claims: Map::new(),
            alg: "ES256".to_string(),
            kid: None,
            signer: None,
            padded: false,
        }
    }

    /// Set the subject
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Add a payload claim
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Override the header `kid` (defaults to the signing key's)
    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = Some(Some(kid.to_string()));
        self
    }

    /// Omit the header `kid`
    pub fn without_kid(mut self) -> Self {
        self.kid = Some(None);
        self
    }

    /// Set the header `signer` ARN
    pub fn signer(mut self, arn: &str) -> Self {
        self.signer = Some(arn.to_string());
        self
    }

    /// Claim a different header `alg`; the signature is still ES256
    pub fn algorithm(mut self, alg: &str) -> Self {
        self.alg = alg.to_string();
        self
    }

    /// Emit `=`-padded segments, as the load balancer does
    pub fn with_padding(mut self) -> Self {
        self.padded = true;
        self
    }

    /// Sign with `key` and return the compact token.
    ///
    /// The signature always covers the unpadded segments; padding is added
    /// afterwards the way the load balancer presents it.
    pub fn sign(self, key: &TestSigningKey) -> String {
        let mut header = Map::new();
        header.insert("alg".to_string(), json!(self.alg));
        header.insert("typ".to_string(), json!("JWT"));
        match self.kid {
            None => {
                header.insert("kid".to_string(), json!(key.kid()));
            }
            Some(Some(kid)) => {
                header.insert("kid".to_string(), json!(kid));
            }
            Some(None) => {}
        }
        if let Some(signer) = &self.signer {
            header.insert("signer".to_string(), json!(signer));
        }
        header.insert("exp".to_string(), json!(self.exp));

        let mut payload = self.claims;
        payload.insert("sub".to_string(), json!(self.sub));
        payload.insert("exp".to_string(), json!(self.exp));

        let header_json = serde_json::to_vec(&Value::Object(header)).expect("header serializes");
        let payload_json =
            serde_json::to_vec(&Value::Object(payload)).expect("payload serializes");

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&header_json),
            URL_SAFE_NO_PAD.encode(&payload_json)
        );
        let signature = key.sign_message(signing_input.as_bytes());

        if self.padded {
            format!(
                "{}.{}.{}",
                URL_SAFE.encode(&header_json),
                URL_SAFE.encode(&payload_json),
                URL_SAFE.encode(&signature)
            )
        } else {
            format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(&signature))
        }
    }
}

impl Default for AlbTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
