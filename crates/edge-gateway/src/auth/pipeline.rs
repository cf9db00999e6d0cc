//! The shared verification pipeline every front end calls.
//!
//! ```text
//! headers -> memo? -> TokenVerifier -> IdentityBinder -> VerifiedIdentity
//! ```

use crate::auth::binding::IdentityBinder;
use crate::auth::failure::AuthFailure;
use crate::auth::headers::OidcHeaders;
use crate::auth::memo::VerificationCache;
use crate::auth::verifier::{TokenVerifier, VerificationResult};
use tracing::instrument;

/// Verifies a request's OIDC headers and enforces the container binding.
pub struct EdgeAuthenticator {
    verifier: TokenVerifier,
    binder: IdentityBinder,
    memo: VerificationCache,
}

impl EdgeAuthenticator {
    pub fn new(verifier: TokenVerifier, binder: IdentityBinder) -> Self {
        Self {
            verifier,
            binder,
            memo: VerificationCache::new(),
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn binder(&self) -> &IdentityBinder {
        &self.binder
    }

    /// Authenticate one request.
    ///
    /// # Errors
    ///
    /// Returns the specific [`AuthFailure`] that denied the request.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, headers: &OidcHeaders) -> VerificationResult {
        let token = match headers.token.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthFailure::MissingToken),
        };
        let identity_header = headers.identity.as_deref();

        // An unreadable binding only disables the memo here; bind_and_check
        // below reports it.
        let bound = self.binder.bound_subject().await.ok().flatten();
        let cached_kid = self.verifier.keys().cached_kid().await;

        self.memo
            .get_or_verify(
                token,
                identity_header,
                bound.as_deref(),
                cached_kid.as_deref(),
                || async {
                    let identity = self.verifier.verify(Some(token), identity_header).await?;
                    self.binder.bind_and_check(&identity.subject).await?;
                    Ok::<_, AuthFailure>(identity)
                },
            )
            .await
    }
}
