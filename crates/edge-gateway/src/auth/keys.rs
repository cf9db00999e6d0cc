//! Signing-key resolver with a single-slot cache.
//!
//! The load balancer publishes one PEM-encoded EC public key per key id at
//! `<base_url><kid>`. The resolver keeps exactly one key in memory: a request
//! for the cached kid is served locally, a request for any other kid fetches
//! and, on success, replaces the slot as a unit.
//!
//! # Concurrency
//!
//! - The slot holds an `Arc<CachedKey>`; readers clone the `Arc` under a read
//!   lock, so they never see a kid paired with another kid's key material
//! - The fetch runs with no lock held, and the write lock is only taken to swap
//!   in the finished entry
//! - Failed fetches never touch the slot

use crate::auth::failure::AuthFailure;
use crate::observability::metrics;
use jsonwebtoken::DecodingKey;
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// Default timeout for a key fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the size of a key document.
const MAX_KEY_BYTES: usize = 16 * 1024;

/// Key material for one kid, as held in the cache slot.
pub struct CachedKey {
    /// Key identifier this material belongs to.
    pub kid: String,

    /// Raw PEM body returned by the endpoint.
    pub pem: String,

    /// Parsed verification key.
    pub decoding_key: DecodingKey,

    /// When the key was fetched.
    pub fetched_at: Instant,
}

impl fmt::Debug for CachedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedKey")
            .field("kid", &self.kid)
            .field("pem_len", &self.pem.len())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Fetches and caches the public key for a token's kid.
pub struct KeyResolver {
    /// Base URL; the kid is appended verbatim.
    base_url: String,

    /// HTTP client with the fetch timeout applied.
    http_client: reqwest::Client,

    /// Single-slot cache.
    slot: RwLock<Option<Arc<CachedKey>>>,

    /// Fetch timeout (kept for diagnostics).
    fetch_timeout: Duration,
}

impl KeyResolver {
    /// Create a resolver for `base_url` with the default fetch timeout.
    pub fn new(base_url: String) -> Self {
        Self::with_timeout(base_url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a resolver with a custom fetch timeout.
    ///
    /// A trailing `/` is added to `base_url` when missing.
    pub fn with_timeout(base_url: String, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "edge.auth.keys", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        let base_url = if base_url.ends_with('/') {
            base_url
        } else {
            format!("{base_url}/")
        };

        Self {
            base_url,
            http_client,
            slot: RwLock::new(None),
            fetch_timeout,
        }
    }

    /// Base URL keys are fetched from.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Kid currently held in the slot, if any.
    pub async fn cached_kid(&self) -> Option<String> {
        self.slot.read().await.as_ref().map(|key| key.kid.clone())
    }

    /// Resolve the key for `kid`.
    ///
    /// Returns the cached entry when it is for this exact kid, otherwise
    /// fetches it and replaces the slot.
    ///
    /// # Errors
    ///
    /// - `AuthFailure::UnknownKey` if the endpoint answers 404
    /// - `AuthFailure::KeyFetchFailed` on transport errors, timeouts, other
    ///   non-success statuses, or a body that is not an EC public key
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<CachedKey>, AuthFailure> {
        {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref().filter(|cached| cached.kid == kid) {
                tracing::debug!(target: "edge.auth.keys", "Key cache hit");
                metrics::record_key_cache("hit");
                return Ok(Arc::clone(cached));
            }
        }
        metrics::record_key_cache("miss");

        let started = Instant::now();
        let fetched = self.fetch(kid).await;
        metrics::record_key_fetch(
            fetched.as_ref().map_or_else(|e| e.as_str(), |_| "success"),
            started.elapsed(),
        );
        let key = Arc::new(fetched?);

        let mut slot = self.slot.write().await;
        if let Some(previous) = slot.as_ref() {
            tracing::info!(
                target: "edge.auth.keys",
                previous_kid = %previous.kid,
                "Evicting cached signing key"
            );
        }
        *slot = Some(Arc::clone(&key));
        tracing::info!(target: "edge.auth.keys", "Signing key cached");

        Ok(key)
    }

    /// Fetch and parse the key for `kid` without touching the cache.
    async fn fetch(&self, kid: &str) -> Result<CachedKey, AuthFailure> {
        let url = format!("{}{}", self.base_url, kid);
        tracing::debug!(target: "edge.auth.keys", url = %url, "Fetching signing key");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            tracing::error!(
                target: "edge.auth.keys",
                error = %e,
                timeout = e.is_timeout(),
                "Failed to fetch signing key"
            );
            AuthFailure::KeyFetchFailed
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::error!(target: "edge.auth.keys", "Key endpoint has no key for kid");
            return Err(AuthFailure::UnknownKey);
        }
        if !status.is_success() {
            tracing::error!(target: "edge.auth.keys", status = %status, "Key endpoint returned error");
            return Err(AuthFailure::KeyFetchFailed);
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(target: "edge.auth.keys", error = %e, "Failed to read key response body");
            AuthFailure::KeyFetchFailed
        })?;

        if body.len() > MAX_KEY_BYTES {
            tracing::error!(target: "edge.auth.keys", size = body.len(), "Key response too large");
            return Err(AuthFailure::KeyFetchFailed);
        }

        let decoding_key = DecodingKey::from_ec_pem(&body).map_err(|e| {
            tracing::error!(target: "edge.auth.keys", error = %e, "Key response is not an EC public key");
            AuthFailure::KeyFetchFailed
        })?;

        Ok(CachedKey {
            kid: kid.to_string(),
            pem: String::from_utf8_lossy(&body).into_owned(),
            decoding_key,
            fetched_at: Instant::now(),
        })
    }

    /// Drop the cached key.
    #[cfg(test)]
    pub async fn clear_cache(&self) {
        *self.slot.write().await = None;
    }
}
