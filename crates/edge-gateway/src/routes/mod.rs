//! HTTP routes for the edge gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{
    EdgeAuthenticator, FileBindingStore, IdentityBinder, KeyResolver, StaticBindingStore,
    TokenVerifier,
};
use crate::bridge::{CookieBridge, CookieSettings};
use crate::config::Config;
use crate::handlers::{self, TunnelState};
use crate::middleware::http_metrics_middleware;
use axum::{middleware, routing::get, Router};
use common::secret::SecretString;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Shared verification pipeline.
    pub authenticator: Arc<EdgeAuthenticator>,

    /// Session cookie minting for `/auth-sign-in`.
    pub cookie_bridge: Arc<CookieBridge>,
}

impl AppState {
    /// Wire the verification pipeline and bridges from `config`.
    ///
    /// A configured `BOUND_SUBJECT` pins the container up front; otherwise the
    /// first authenticated subject is recorded in the identity file.
    pub fn new(config: Config, session_secret: SecretString) -> Self {
        let keys = Arc::new(KeyResolver::with_timeout(
            config.key_server_url.clone(),
            config.key_fetch_timeout,
        ));
        let verifier = TokenVerifier::new(keys)
            .with_leeway(config.jwt_clock_skew_seconds)
            .with_expected_signer(config.alb_signer_arn.clone());

        let binder = match &config.bound_subject {
            Some(subject) => IdentityBinder::new(StaticBindingStore::new(subject.clone())),
            None => IdentityBinder::new(FileBindingStore::new(config.identity_file.clone())),
        };

        let cookie_bridge = CookieBridge::new(
            session_secret,
            CookieSettings {
                cookie_name: config.session_cookie_name.clone(),
                validity: chrono::TimeDelta::days(i64::from(config.session_validity_days)),
                username: config.session_username.clone(),
                redirect: config.sign_in_redirect.clone(),
                csrf_domain: config.csrf_cookie_domain.clone(),
            },
        );

        Self {
            config,
            authenticator: Arc::new(EdgeAuthenticator::new(verifier, binder)),
            cookie_bridge: Arc::new(cookie_bridge),
        }
    }
}

/// Build the application routes.
///
/// - `/ping` - liveness
/// - `/metrics` - Prometheus scrape
/// - `/api/v1/me` - claims pass-through
/// - `/auth-sign-in`, `/auth-sign-out` - cookie bridge, also under the
///   configured route prefix
/// - `/login` - trust-flag login
/// - `/websockify` - authenticated tunnel, only when a target is configured
///
/// Layers, outermost first: HTTP metrics, request timeout, tracing. The
/// timeout does not apply to an upgraded tunnel, only to the handshake.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let mut app_routes = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/api/v1/me", get(handlers::get_me))
        .route("/login", get(handlers::login));

    let prefixes = std::iter::once("").chain(state.config.route_prefix.as_deref());
    for prefix in prefixes {
        app_routes = app_routes
            .route(
                &format!("{prefix}/auth-sign-in"),
                get(handlers::sign_in).post(handlers::sign_in),
            )
            .route(
                &format!("{prefix}/auth-sign-out"),
                get(handlers::sign_out).post(handlers::sign_out),
            );
    }

    let mut app = app_routes.with_state(Arc::clone(&state));

    if let Some(target) = &state.config.tunnel_target {
        let tunnel_state = Arc::new(TunnelState {
            authenticator: Arc::clone(&state.authenticator),
            target: target.clone(),
        });
        app = app.merge(
            Router::new()
                .route("/websockify", get(handlers::websockify))
                .with_state(tunnel_state),
        );
    }

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    app.merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
