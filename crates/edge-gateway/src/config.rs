//! Edge gateway configuration.
//!
//! Configuration is loaded from environment variables. The bound subject is
//! redacted in Debug output; the session secret is never part of `Config`,
//! only the path it is read from.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default AWS region, used to derive the key endpoint.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Default key fetch timeout in seconds.
pub const DEFAULT_KEY_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// Upper bound on the key fetch timeout in seconds.
pub const MAX_KEY_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Default durable identity record.
pub const DEFAULT_IDENTITY_FILE: &str = "/usr/local/gateway/id";

/// Default session cookie secret, as written by RStudio Server.
pub const DEFAULT_SESSION_SECRET_FILE: &str = "/var/lib/rstudio-server/secure-cookie-key";

/// Default wait for the session secret file at start-up, in seconds.
pub const DEFAULT_SESSION_SECRET_WAIT_SECONDS: u64 = 300;

/// Default bridged cookie name.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "user-id";

/// Default bridged cookie validity in days.
pub const DEFAULT_SESSION_VALIDITY_DAYS: u32 = 30;

/// Upper bound on bridged cookie validity in days.
pub const MAX_SESSION_VALIDITY_DAYS: u32 = 365;

/// Key endpoint for `region`.
pub fn regional_key_server_url(region: &str) -> String {
    format!("https://public-keys.auth.elb.{region}.amazonaws.com/")
}

/// Edge gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// AWS region of the load balancer.
    pub region: String,

    /// Key-distribution base URL; the kid is appended.
    pub key_server_url: String,

    /// Timeout for a single key fetch.
    pub key_fetch_timeout: Duration,

    /// Leeway applied to token `exp`, in seconds.
    pub jwt_clock_skew_seconds: u64,

    /// Load balancer ARN the token header `signer` must equal, if set.
    pub alb_signer_arn: Option<String>,

    /// Durable container identity record.
    pub identity_file: PathBuf,

    /// Pre-provisioned container identity. Replaces the identity file.
    pub bound_subject: Option<String>,

    /// File holding the session cookie HMAC secret.
    pub session_secret_file: PathBuf,

    /// How long start-up waits for the secret file.
    pub session_secret_wait: Duration,

    /// Name of the bridged session cookie.
    pub session_cookie_name: String,

    /// Validity of a minted session cookie, in days.
    pub session_validity_days: u32,

    /// Local account placed in the cookie instead of the verified subject.
    pub session_username: Option<String>,

    /// Redirect target after sign-in.
    pub sign_in_redirect: String,

    /// Domain of the companion `csrf-token` cookie.
    pub csrf_cookie_domain: Option<String>,

    /// External logout location.
    pub logout_url: String,

    /// Load balancer session cookie also cleared on logout.
    pub alb_session_cookie: Option<String>,

    /// Prefix post-login redirects must stay under.
    pub login_base_url: String,

    /// `host:port` the WebSocket tunnel connects to.
    pub tunnel_target: Option<String>,

    /// Path prefix under which the cookie routes are also mounted, e.g.
    /// `/rstudio/alice`.
    pub route_prefix: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("region", &self.region)
            .field("key_server_url", &self.key_server_url)
            .field("key_fetch_timeout", &self.key_fetch_timeout)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("alb_signer_arn", &self.alb_signer_arn)
            .field("identity_file", &self.identity_file)
            .field(
                "bound_subject",
                &self.bound_subject.as_ref().map(|_| "[REDACTED]"),
            )
            .field("session_secret_file", &self.session_secret_file)
            .field("session_secret_wait", &self.session_secret_wait)
            .field("session_cookie_name", &self.session_cookie_name)
            .field("session_validity_days", &self.session_validity_days)
            .field("session_username", &self.session_username)
            .field("sign_in_redirect", &self.sign_in_redirect)
            .field("csrf_cookie_domain", &self.csrf_cookie_domain)
            .field("logout_url", &self.logout_url)
            .field("alb_session_cookie", &self.alb_session_cookie)
            .field("login_base_url", &self.login_base_url)
            .field("tunnel_target", &self.tunnel_target)
            .field("route_prefix", &self.route_prefix)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid key fetch timeout configuration: {0}")]
    InvalidKeyFetchTimeout(String),

    #[error("Invalid session configuration: {0}")]
    InvalidSession(String),

    #[error("Invalid tunnel target: {0}")]
    InvalidTunnelTarget(String),

    #[error("Invalid route prefix: {0}")]
    InvalidRoutePrefix(String),
}

/// Parse `name` as an integer in `1..=max`, or return `default` when unset.
fn parse_bounded<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    max: T,
    err: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default + fmt::Display + Copy,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e| {
        err(format!(
            "{name} must be a valid integer, got '{value_str}': {e}"
        ))
    })?;

    if value <= T::default() {
        return Err(err(format!("{name} must be positive, got {value}")));
    }

    if value > max {
        return Err(err(format!("{name} must not exceed {max}, got {value}")));
    }

    Ok(value)
}

/// Non-empty value of `name`, if set.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let logout_url = optional(vars, "LOGOUT_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("LOGOUT_URL".to_string()))?;

        let bind_address =
            optional(vars, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let region = optional(vars, "AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());

        let key_server_url = optional(vars, "KEY_SERVER_URL")
            .unwrap_or_else(|| regional_key_server_url(&region));

        let key_fetch_timeout_seconds = parse_bounded(
            vars,
            "KEY_FETCH_TIMEOUT_SECONDS",
            DEFAULT_KEY_FETCH_TIMEOUT_SECONDS,
            MAX_KEY_FETCH_TIMEOUT_SECONDS,
            ConfigError::InvalidKeyFetchTimeout,
        )?;

        let jwt_clock_skew_seconds = parse_bounded(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            MAX_CLOCK_SKEW.as_secs(),
            ConfigError::InvalidJwtClockSkew,
        )?;

        let session_validity_days = parse_bounded(
            vars,
            "SESSION_VALIDITY_DAYS",
            DEFAULT_SESSION_VALIDITY_DAYS,
            MAX_SESSION_VALIDITY_DAYS,
            ConfigError::InvalidSession,
        )?;

        let session_secret_wait_seconds = match vars.get("SESSION_SECRET_WAIT_SECONDS") {
            Some(value_str) => value_str.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidSession(format!(
                    "SESSION_SECRET_WAIT_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?,
            None => DEFAULT_SESSION_SECRET_WAIT_SECONDS,
        };

        let session_cookie_name = optional(vars, "SESSION_COOKIE_NAME")
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());
        if session_cookie_name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | ',' | '='))
        {
            return Err(ConfigError::InvalidSession(format!(
                "SESSION_COOKIE_NAME is not a valid cookie name: '{session_cookie_name}'"
            )));
        }

        let tunnel_target = optional(vars, "TUNNEL_TARGET");
        if let Some(target) = &tunnel_target {
            let has_port = target
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !has_port {
                return Err(ConfigError::InvalidTunnelTarget(format!(
                    "TUNNEL_TARGET must be host:port, got '{target}'"
                )));
            }
        }

        let route_prefix = optional(vars, "ROUTE_PREFIX");
        if let Some(prefix) = &route_prefix {
            let valid = prefix.len() > 1
                && prefix.starts_with('/')
                && !prefix.ends_with('/')
                && !prefix.contains("//")
                && !prefix
                    .chars()
                    .any(|c| c.is_whitespace() || matches!(c, '?' | '#' | '{' | '}' | '*' | ':'));
            if !valid {
                return Err(ConfigError::InvalidRoutePrefix(format!(
                    "ROUTE_PREFIX must look like /segment[/segment...], got '{prefix}'"
                )));
            }
        }

        Ok(Config {
            bind_address,
            region,
            key_server_url,
            key_fetch_timeout: Duration::from_secs(key_fetch_timeout_seconds),
            jwt_clock_skew_seconds,
            alb_signer_arn: optional(vars, "ALB_SIGNER_ARN"),
            identity_file: optional(vars, "IDENTITY_FILE")
                .unwrap_or_else(|| DEFAULT_IDENTITY_FILE.to_string())
                .into(),
            bound_subject: optional(vars, "BOUND_SUBJECT"),
            session_secret_file: optional(vars, "SESSION_SECRET_FILE")
                .unwrap_or_else(|| DEFAULT_SESSION_SECRET_FILE.to_string())
                .into(),
            session_secret_wait: Duration::from_secs(session_secret_wait_seconds),
            session_cookie_name,
            session_validity_days,
            session_username: optional(vars, "SESSION_USERNAME"),
            sign_in_redirect: optional(vars, "SIGN_IN_REDIRECT").unwrap_or_else(|| "/".to_string()),
            csrf_cookie_domain: optional(vars, "CSRF_COOKIE_DOMAIN"),
            logout_url,
            alb_session_cookie: optional(vars, "ALB_SESSION_COOKIE"),
            login_base_url: optional(vars, "LOGIN_BASE_URL").unwrap_or_else(|| "/".to_string()),
            tunnel_target,
            route_prefix,
        })
    }
}
