//! Memo of the most recent successful verification.
//!
//! A browser session repeats the same token and identity header on every
//! request until the load balancer refreshes them. Holding the last success
//! lets those requests skip signature work. Only successes are stored; a
//! failure always falls through to a full verification next time.

use crate::auth::claims::VerifiedIdentity;
use crate::auth::verifier::VerificationResult;
use crate::observability::metrics;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Inputs a memoised success was produced from.
struct Memo {
    token: String,
    identity_header: Option<String>,
    identity: VerifiedIdentity,
}

impl Memo {
    fn matches(
        &self,
        token: &str,
        identity_header: Option<&str>,
        bound_subject: Option<&str>,
        cached_kid: Option<&str>,
        now: i64,
    ) -> bool {
        self.token == token
            && self.identity_header.as_deref() == identity_header
            && bound_subject == Some(self.identity.subject.as_str())
            && cached_kid == Some(self.identity.key_id.as_str())
            && !self.identity.claims.is_expired_at(now)
    }
}

/// Single-slot verification memo.
#[derive(Default)]
pub struct VerificationCache {
    slot: RwLock<Option<Arc<Memo>>>,
}

impl VerificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoised success for these inputs, or run `verify`.
    ///
    /// The memo is reused only when the token, the identity header, the
    /// container's bound subject and the resolver's cached kid all equal
    /// what they were when the success was recorded, and the token has not
    /// expired since. A successful `verify` replaces the memo.
    pub async fn get_or_verify<F, Fut>(
        &self,
        token: &str,
        identity_header: Option<&str>,
        bound_subject: Option<&str>,
        cached_kid: Option<&str>,
        verify: F,
    ) -> VerificationResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = VerificationResult>,
    {
        let now = chrono::Utc::now().timestamp();
        {
            let slot = self.slot.read().await;
            if let Some(memo) = slot
                .as_ref()
                .filter(|m| m.matches(token, identity_header, bound_subject, cached_kid, now))
            {
                tracing::debug!(target: "edge.auth.memo", "Verification memo hit");
                metrics::record_verification_cache("hit");
                return Ok(memo.identity.clone());
            }
        }
        metrics::record_verification_cache("miss");

        let result = verify().await;
        if let Ok(identity) = &result {
            *self.slot.write().await = Some(Arc::new(Memo {
                token: token.to_string(),
                identity_header: identity_header.map(str::to_string),
                identity: identity.clone(),
            }));
        }
        result
    }

    /// Drop the memo.
    pub async fn clear(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::claims::OidcClaims;
    use crate::auth::failure::AuthFailure;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity(subject: &str, kid: &str, exp: i64) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: subject.to_string(),
            key_id: kid.to_string(),
            claims: OidcClaims {
                sub: subject.to_string(),
                exp,
                iss: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    struct Counter(AtomicUsize);

    impl Counter {
        fn new() -> Self {
            Self(AtomicUsize::new(0))
        }

        async fn verify(&self, result: VerificationResult) -> VerificationResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            result
        }

        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_identical_inputs_hit() {
        let cache = VerificationCache::new();
        let counter = Counter::new();
        let ok = identity("alice", "k1", future_exp());

        for _ in 0..3 {
            let result = cache
                .get_or_verify("tok", Some("alice"), Some("alice"), Some("k1"), || {
                    counter.verify(Ok(ok.clone()))
                })
                .await;
            assert_eq!(result.unwrap(), ok);
        }

        assert_eq!(counter.calls(), 1);
    }

    #[tokio::test]
    async fn test_any_changed_input_misses() {
        let cache = VerificationCache::new();
        let counter = Counter::new();
        let ok = identity("alice", "k1", future_exp());

        cache
            .get_or_verify("tok", Some("alice"), Some("alice"), Some("k1"), || {
                counter.verify(Ok(ok.clone()))
            })
            .await
            .unwrap();

        let variants: [(&str, Option<&str>, Option<&str>, Option<&str>); 4] = [
            ("other-tok", Some("alice"), Some("alice"), Some("k1")),
            ("tok", Some("bob"), Some("alice"), Some("k1")),
            ("tok", Some("alice"), Some("bob"), Some("k1")),
            ("tok", Some("alice"), Some("alice"), Some("k2")),
        ];
        for (token, header, bound, kid) in variants {
            let _ = cache
                .get_or_verify(token, header, bound, kid, || {
                    counter.verify(Err(AuthFailure::InvalidSignature))
                })
                .await;
        }

        assert_eq!(counter.calls(), 5);
    }

    #[tokio::test]
    async fn test_failures_are_not_memoised() {
        let cache = VerificationCache::new();
        let counter = Counter::new();

        for _ in 0..2 {
            let result = cache
                .get_or_verify("tok", Some("alice"), Some("alice"), Some("k1"), || {
                    counter.verify(Err(AuthFailure::ExpiredToken))
                })
                .await;
            assert_eq!(result.unwrap_err(), AuthFailure::ExpiredToken);
        }

        assert_eq!(counter.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_evict_success() {
        let cache = VerificationCache::new();
        let counter = Counter::new();
        let ok = identity("alice", "k1", future_exp());

        cache
            .get_or_verify("tok", Some("alice"), Some("alice"), Some("k1"), || {
                counter.verify(Ok(ok.clone()))
            })
            .await
            .unwrap();
        let _ = cache
            .get_or_verify("bad", Some("alice"), Some("alice"), Some("k1"), || {
                counter.verify(Err(AuthFailure::InvalidSignature))
            })
            .await;
        cache
            .get_or_verify("tok", Some("alice"), Some("alice"), Some("k1"), || {
                counter.verify(Ok(ok.clone()))
            })
            .await
            .unwrap();

        assert_eq!(counter.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_memo_is_not_reused() {
        let cache = VerificationCache::new();
        let counter = Counter::new();
        let stale = identity("alice", "k1", chrono::Utc::now().timestamp() - 1);

        for _ in 0..2 {
            let _ = cache
                .get_or_verify("tok", Some("alice"), Some("alice"), Some("k1"), || {
                    counter.verify(Ok(stale.clone()))
                })
                .await;
        }

        assert_eq!(counter.calls(), 2);
    }

    #[tokio::test]
    async fn test_unbound_container_never_hits() {
        let cache = VerificationCache::new();
        let counter = Counter::new();
        let ok = identity("alice", "k1", future_exp());

        for _ in 0..2 {
            cache
                .get_or_verify("tok", Some("alice"), None, Some("k1"), || {
                    counter.verify(Ok(ok.clone()))
                })
                .await
                .unwrap();
        }

        assert_eq!(counter.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = VerificationCache::new();
        let counter = Counter::new();
        let ok = identity("alice", "k1", future_exp());

        for _ in 0..2 {
            cache
                .get_or_verify("tok", Some("alice"), Some("alice"), Some("k1"), || {
                    counter.verify(Ok(ok.clone()))
                })
                .await
                .unwrap();
            cache.clear().await;
        }

        assert_eq!(counter.calls(), 2);
    }
}
