//! Test server harness for E2E testing
//!
//! Provides `TestGateway` for spawning real gateway instances in tests.

use crate::key_server::MockKeyServer;
use common::secret::{read_secret_file, SecretString};
use edge_gateway::config::Config;
use edge_gateway::observability::metrics::metrics_builder;
use edge_gateway::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Session secret every harness instance signs cookies with.
pub const TEST_SESSION_SECRET: &str = "test-session-secret";

/// Logout URL every harness instance redirects to.
pub const TEST_LOGOUT_URL: &str = "https://idp.example.com/logout";

/// Test harness for spawning the edge gateway in E2E tests.
///
/// Each instance gets its own temporary directory for the identity record
/// and session secret, so bindings never leak between tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ping_e2e() -> anyhow::Result<()> {
///     let keys = MockKeyServer::start().await;
///     let gateway = TestGateway::spawn(&keys).await?;
///
///     let response = reqwest::get(format!("{}/ping", gateway.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGateway {
    addr: SocketAddr,
    config: Config,
    state: Arc<AppState>,
    _dir: TempDir,
    _handle: JoinHandle<()>,
}

impl TestGateway {
    /// Spawn a gateway that fetches keys from `keys`.
    pub async fn spawn(keys: &MockKeyServer) -> Result<Self, anyhow::Error> {
        Self::spawn_with(keys, &[]).await
    }

    /// Spawn a gateway with extra environment-style overrides, e.g.
    /// `("TUNNEL_TARGET", "127.0.0.1:5901")`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Load its session secret from a file in a fresh temp dir
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        keys: &MockKeyServer,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let identity_file = dir.path().join("identity");
        let secret_file = dir.path().join("session-secret");
        tokio::fs::write(&secret_file, TEST_SESSION_SECRET).await?;

        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("KEY_SERVER_URL".to_string(), keys.base_url()),
            (
                "IDENTITY_FILE".to_string(),
                identity_file.display().to_string(),
            ),
            (
                "SESSION_SECRET_FILE".to_string(),
                secret_file.display().to_string(),
            ),
            ("LOGOUT_URL".to_string(), TEST_LOGOUT_URL.to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let session_secret = read_secret_file(&config.session_secret_file).await?;
        let state = Arc::new(AppState::new(config.clone(), session_secret));

        // Recorder is built but not installed so tests can run in parallel
        let metrics_handle = metrics_builder()
            .map_err(|e| anyhow::anyhow!("Failed to build metrics recorder: {}", e))?
            .build_recorder()
            .handle();

        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            state,
            _dir: dir,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the WebSocket base URL of the test server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the shared application state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Path of the identity binding record.
    pub fn identity_file(&self) -> PathBuf {
        self.config.identity_file.clone()
    }

    /// Secret the gateway signs session cookies with.
    pub fn session_secret(&self) -> SecretString {
        SecretString::from(TEST_SESSION_SECRET)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
