//! Identity-token verification.
//!
//! Checks, in order, short-circuiting on the first failure:
//!
//! 1. A token is present
//! 2. The unverified header decodes and names a usable kid
//! 3. The header `signer` matches the pinned load balancer (when configured)
//! 4. The key for the kid resolves
//! 5. The ES256 signature and `exp` are valid
//! 6. The token `sub` is non-empty
//! 7. The token `sub` equals the identity header
//!
//! The identity header is never trusted alone, and a valid token is never
//! accepted for a header naming someone else.

use crate::auth::claims::{OidcClaims, VerifiedIdentity};
use crate::auth::failure::AuthFailure;
use crate::auth::keys::{CachedKey, KeyResolver};
use common::jwt::{decode_unverified_header, normalize_padding, DEFAULT_CLOCK_SKEW};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::sync::Arc;
use tracing::instrument;

/// Outcome of a verification.
pub type VerificationResult = Result<VerifiedIdentity, AuthFailure>;

/// Verifies load-balancer identity tokens against resolved keys.
pub struct TokenVerifier {
    /// Key resolver shared with the verification cache.
    keys: Arc<KeyResolver>,

    /// Leeway in seconds applied to `exp`.
    leeway_seconds: u64,

    /// Expected `signer` header value, if pinned.
    expected_signer: Option<String>,
}

impl TokenVerifier {
    /// Create a verifier using the default leeway and no signer pinning.
    pub fn new(keys: Arc<KeyResolver>) -> Self {
        Self {
            keys,
            leeway_seconds: DEFAULT_CLOCK_SKEW.as_secs(),
            expected_signer: None,
        }
    }

    /// Set the `exp` leeway.
    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    /// Require the header `signer` to equal `signer`.
    pub fn with_expected_signer(mut self, signer: Option<String>) -> Self {
        self.expected_signer = signer;
        self
    }

    /// Key resolver used by this verifier.
    pub fn keys(&self) -> &Arc<KeyResolver> {
        &self.keys
    }

    /// Verify `token` and check it against `identity_header`.
    ///
    /// # Errors
    ///
    /// Returns the first [`AuthFailure`] encountered; see the module docs for
    /// the order of checks.
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        token: Option<&str>,
        identity_header: Option<&str>,
    ) -> VerificationResult {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthFailure::MissingToken),
        };

        let token = normalize_padding(token);
        let header = decode_unverified_header(&token).map_err(|e| {
            tracing::debug!(target: "edge.auth.verify", error = %e, "Token header rejected");
            AuthFailure::from(e)
        })?;

        if let Some(expected) = &self.expected_signer {
            if header.signer.as_deref() != Some(expected.as_str()) {
                tracing::debug!(target: "edge.auth.verify", "Token signer does not match pinned load balancer");
                return Err(AuthFailure::InvalidSignature);
            }
        }

        let key = self.keys.resolve(&header.kid).await?;
        let claims = verify_signature(&token, &key, self.leeway_seconds)?;

        if claims.sub.is_empty() {
            tracing::debug!(target: "edge.auth.verify", "Token subject is empty");
            return Err(AuthFailure::MalformedToken);
        }

        if identity_header != Some(claims.sub.as_str()) {
            tracing::debug!(
                target: "edge.auth.verify",
                header_present = identity_header.is_some(),
                "Token subject does not match identity header"
            );
            return Err(AuthFailure::SubjectMismatch);
        }

        tracing::debug!(target: "edge.auth.verify", "Token verified");
        Ok(VerifiedIdentity {
            subject: claims.sub.clone(),
            key_id: header.kid,
            claims,
        })
    }
}

/// Verify the ES256 signature and `exp` of `token` with `key`.
fn verify_signature(
    token: &str,
    key: &CachedKey,
    leeway_seconds: u64,
) -> Result<OidcClaims, AuthFailure> {
    let mut validation = Validation::new(Algorithm::ES256);
    validation.leeway = leeway_seconds;
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<OidcClaims>(token, &key.decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                tracing::debug!(target: "edge.auth.verify", "Token expired");
                AuthFailure::ExpiredToken
            }
            _ => {
                tracing::debug!(target: "edge.auth.verify", error = %e, "Token verification failed");
                AuthFailure::InvalidSignature
            }
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use edge_test_utils::{AlbTokenBuilder, MockKeyServer, TestSigningKey};

    async fn setup(kid: &str) -> (MockKeyServer, TestSigningKey, TokenVerifier) {
        let server = MockKeyServer::start().await;
        let key = TestSigningKey::generate(kid);
        server.publish(&key).await;
        let verifier = TokenVerifier::new(Arc::new(KeyResolver::new(server.base_url())));
        (server, key, verifier)
    }

    #[tokio::test]
    async fn test_valid_token_verifies() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new()
            .for_subject("alice")
            .with_claim("email", "alice@example.com")
            .sign(&key);

        let identity = verifier.verify(Some(&token), Some("alice")).await.unwrap();

        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.key_id, "kid-1");
        assert_eq!(identity.claims.claim_str("email"), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_missing_and_empty_token() {
        let (_server, _key, verifier) = setup("kid-1").await;

        assert_eq!(
            verifier.verify(None, Some("alice")).await.unwrap_err(),
            AuthFailure::MissingToken
        );
        assert_eq!(
            verifier.verify(Some(""), Some("alice")).await.unwrap_err(),
            AuthFailure::MissingToken
        );
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let (server, _key, verifier) = setup("kid-1").await;

        let result = verifier.verify(Some("not-a-jwt"), Some("alice")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::MalformedToken);
        assert_eq!(server.total_fetches().await, 0);
    }

    #[tokio::test]
    async fn test_missing_kid_is_malformed() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new()
            .for_subject("alice")
            .without_kid()
            .sign(&key);

        let result = verifier.verify(Some(&token), Some("alice")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::MalformedToken);
    }

    #[tokio::test]
    async fn test_empty_subject_is_malformed() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new().for_subject("").sign(&key);

        let result = verifier.verify(Some(&token), Some("")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::MalformedToken);
    }

    #[tokio::test]
    async fn test_subject_mismatch_with_valid_signature() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new().for_subject("alice").sign(&key);

        let result = verifier.verify(Some(&token), Some("mallory")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::SubjectMismatch);

        let result = verifier.verify(Some(&token), None).await;
        assert_eq!(result.unwrap_err(), AuthFailure::SubjectMismatch);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new()
            .for_subject("alice")
            .expires_in(-3600)
            .sign(&key);

        let result = verifier.verify(Some(&token), Some("alice")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::ExpiredToken);
    }

    #[tokio::test]
    async fn test_expiry_within_leeway_is_accepted() {
        let (_server, key, verifier) = setup("kid-1").await;
        let verifier = verifier.with_leeway(120);
        let token = AlbTokenBuilder::new()
            .for_subject("alice")
            .expires_in(-30)
            .sign(&key);

        assert!(verifier.verify(Some(&token), Some("alice")).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_signed_by_other_key_is_rejected() {
        let (_server, _published, verifier) = setup("kid-1").await;
        // Same kid, different private key
        let impostor = TestSigningKey::generate("kid-1");
        let token = AlbTokenBuilder::new().for_subject("alice").sign(&impostor);

        let result = verifier.verify(Some(&token), Some("alice")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::InvalidSignature);
    }

    #[tokio::test]
    async fn test_unpublished_kid_never_succeeds() {
        let (server, _published, verifier) = setup("kid-1").await;
        server.respond_with_status("rogue", 404).await;
        let rogue = TestSigningKey::generate("rogue");
        let token = AlbTokenBuilder::new().for_subject("alice").sign(&rogue);

        let result = verifier.verify(Some(&token), Some("alice")).await;
        assert!(matches!(
            result,
            Err(AuthFailure::UnknownKey | AuthFailure::KeyFetchFailed)
        ));
    }

    #[tokio::test]
    async fn test_tampered_payload_is_rejected() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new().for_subject("alice").sign(&key);
        let forged = AlbTokenBuilder::new().for_subject("mallory").sign(&key);

        // Splice mallory's payload under alice's signature
        let (header, rest) = token.split_once('.').unwrap();
        let (_, signature) = rest.split_once('.').unwrap();
        let (_, forged_rest) = forged.split_once('.').unwrap();
        let (forged_payload, _) = forged_rest.split_once('.').unwrap();
        let spliced = format!("{header}.{forged_payload}.{signature}");

        let result = verifier.verify(Some(&spliced), Some("mallory")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::InvalidSignature);
    }

    #[tokio::test]
    async fn test_padded_token_verifies() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new()
            .for_subject("alice")
            .with_padding()
            .sign(&key);

        let identity = verifier.verify(Some(&token), Some("alice")).await.unwrap();
        assert_eq!(identity.subject, "alice");
    }

    #[tokio::test]
    async fn test_signer_pinning() {
        let (server, key, verifier) = setup("kid-1").await;
        let verifier = verifier.with_expected_signer(Some("arn:aws:lb/expected".to_string()));

        let good = AlbTokenBuilder::new()
            .for_subject("alice")
            .signer("arn:aws:lb/expected")
            .sign(&key);
        assert!(verifier.verify(Some(&good), Some("alice")).await.is_ok());

        let other = AlbTokenBuilder::new()
            .for_subject("alice")
            .signer("arn:aws:lb/other")
            .sign(&key);
        assert_eq!(
            verifier.verify(Some(&other), Some("alice")).await.unwrap_err(),
            AuthFailure::InvalidSignature
        );

        let unsigned = AlbTokenBuilder::new().for_subject("alice").sign(&key);
        assert_eq!(
            verifier
                .verify(Some(&unsigned), Some("alice"))
                .await
                .unwrap_err(),
            AuthFailure::InvalidSignature
        );

        // Only the first, accepted token triggered a fetch
        assert_eq!(server.total_fetches().await, 1);
    }

    #[tokio::test]
    async fn test_other_algorithm_is_rejected() {
        let (_server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new()
            .for_subject("alice")
            .algorithm("HS256")
            .sign(&key);

        let result = verifier.verify(Some(&token), Some("alice")).await;
        assert_eq!(result.unwrap_err(), AuthFailure::InvalidSignature);
    }

    #[tokio::test]
    async fn test_repeat_verification_is_idempotent_and_cached() {
        let (server, key, verifier) = setup("kid-1").await;
        let token = AlbTokenBuilder::new().for_subject("alice").sign(&key);

        let first = verifier.verify(Some(&token), Some("alice")).await;
        let second = verifier.verify(Some(&token), Some("alice")).await;

        assert_eq!(first, second);
        assert_eq!(server.fetch_count("kid-1").await, 1);
    }
}
