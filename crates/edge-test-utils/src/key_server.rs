//! Mock regional key-distribution endpoint
//!
//! Serves PEM public keys at `<base_url><kid>` the way the load balancer's
//! public key endpoint does, and counts fetches so tests can assert on
//! caching.

use crate::crypto_fixtures::TestSigningKey;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path prefix the keys are served under.
const KEY_PREFIX: &str = "/keys/";

/// Wiremock-backed key server.
///
/// # Example
/// ```rust,ignore
/// let server = MockKeyServer::start().await;
/// let key = TestSigningKey::generate("kid-1");
/// server.publish(&key).await;
///
/// let resolver = KeyResolver::new(server.base_url());
/// resolver.resolve("kid-1").await?;
/// assert_eq!(server.fetch_count("kid-1").await, 1);
/// ```
pub struct MockKeyServer {
    server: MockServer,
}

impl MockKeyServer {
    /// Start an empty key server. Unknown kids get wiremock's default 404.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to hand to the key resolver, with trailing `/`.
    pub fn base_url(&self) -> String {
        format!("{}{}", self.server.uri(), KEY_PREFIX)
    }

    /// Serve `key`'s public PEM under its kid.
    pub async fn publish(&self, key: &TestSigningKey) {
        self.mount(
            key.kid(),
            ResponseTemplate::new(200).set_body_string(key.public_key_pem()),
        )
        .await;
    }

    /// Serve `key` only after `delay`, for timeout tests.
    pub async fn publish_delayed(&self, key: &TestSigningKey, delay: Duration) {
        self.mount(
            key.kid(),
            ResponseTemplate::new(200)
                .set_body_string(key.public_key_pem())
                .set_delay(delay),
        )
        .await;
    }

    /// Answer requests for `kid` with a bare status code.
    pub async fn respond_with_status(&self, kid: &str, status: u16) {
        self.mount(kid, ResponseTemplate::new(status)).await;
    }

    /// Answer requests for `kid` with an arbitrary 200 body.
    pub async fn respond_with_body(&self, kid: &str, body: &str) {
        self.mount(kid, ResponseTemplate::new(200).set_body_string(body))
            .await;
    }

    /// Number of requests made for `kid`.
    pub async fn fetch_count(&self, kid: &str) -> usize {
        let wanted = format!("{KEY_PREFIX}{kid}");
        self.received()
            .await
            .iter()
            .filter(|request| request.url.path() == wanted)
            .count()
    }

    /// Number of requests made for any key.
    pub async fn total_fetches(&self) -> usize {
        self.received().await.len()
    }

    async fn mount(&self, kid: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("{KEY_PREFIX}{kid}")))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    async fn received(&self) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .expect("request recording is enabled by default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_serves_pem_and_counts_fetches() {
        let server = MockKeyServer::start().await;
        let key = TestSigningKey::generate("kid-1");
        server.publish(&key).await;

        let body = reqwest::get(format!("{}kid-1", server.base_url()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(body, key.public_key_pem());
        assert_eq!(server.fetch_count("kid-1").await, 1);
        assert_eq!(server.fetch_count("kid-2").await, 0);
        assert_eq!(server.total_fetches().await, 1);
    }

    #[tokio::test]
    async fn test_respond_with_status() {
        let server = MockKeyServer::start().await;
        server.respond_with_status("broken", 503).await;

        let response = reqwest::get(format!("{}broken", server.base_url()))
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }
}
