//! Cookie bridge for backends with their own HMAC session cookie.
//!
//! The cookie value is the RStudio Server `user-id` format:
//!
//! ```text
//! urlquote("<user>|<expiry>|<base64(HMAC-SHA256(secret, user + expiry))>")
//! ```
//!
//! where `<expiry>` is `%a, %d %b %Y %H:%M:%S GMT` and `|` is left unescaped.
//! The cookie's validity is fixed at mint time and independent of the
//! identity token's own `exp`.

use super::{record_outcome, SessionBridge};
use crate::auth::verifier::VerificationResult;
use crate::errors::GatewayError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use common::secret::{ExposeSecret, SecretString};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Expiry timestamp format inside the cookie.
pub const EXPIRY_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Name of the companion CSRF cookie.
pub const CSRF_COOKIE_NAME: &str = "csrf-token";

/// Errors from parsing or checking a session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookieError {
    #[error("cookie is not valid percent-encoding")]
    Encoding,

    #[error("cookie does not have three segments")]
    Format,

    #[error("cookie expiry is not a valid timestamp")]
    Expiry,

    #[error("cookie signature is invalid")]
    Signature,

    #[error("cookie has expired")]
    Expired,

    #[error("secret cannot be used as an HMAC key")]
    Key,
}

/// A session cookie's payload.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub username: String,
    pub expires: DateTime<Utc>,
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("username", &"[REDACTED]")
            .field("expires", &self.expires)
            .finish()
    }
}

fn mac(secret: &SecretString, username: &str, expiry: &str) -> Result<HmacSha256, CookieError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| CookieError::Key)?;
    mac.update(username.as_bytes());
    mac.update(expiry.as_bytes());
    Ok(mac)
}

impl SessionCookie {
    /// A cookie for `username` valid for `validity` from `now`.
    ///
    /// The expiry is truncated to whole seconds, the cookie's precision.
    pub fn mint(username: impl Into<String>, validity: TimeDelta, now: DateTime<Utc>) -> Self {
        let expires = now + validity;
        let expires = DateTime::from_timestamp(expires.timestamp(), 0).unwrap_or(expires);
        Self {
            username: username.into(),
            expires,
        }
    }

    fn expiry_string(&self) -> String {
        self.expires.format(EXPIRY_FORMAT).to_string()
    }

    /// Signed, URL-quoted cookie value.
    ///
    /// # Errors
    ///
    /// Returns `CookieError::Key` if `secret` is rejected as an HMAC key.
    pub fn encode(&self, secret: &SecretString) -> Result<String, CookieError> {
        let expiry = self.expiry_string();
        let signature = STANDARD.encode(mac(secret, &self.username, &expiry)?.finalize().into_bytes());
        let raw = format!("{}|{}|{}", self.username, expiry, signature);
        Ok(urlencoding::encode(&raw).replace("%7C", "|"))
    }

    /// Parse and check a cookie value produced by [`SessionCookie::encode`].
    ///
    /// # Errors
    ///
    /// Returns a [`CookieError`] if the value is malformed, the signature does
    /// not match `secret`, or the cookie expired at or before `now`.
    pub fn verify(
        value: &str,
        secret: &SecretString,
        now: DateTime<Utc>,
    ) -> Result<Self, CookieError> {
        let decoded = urlencoding::decode(value).map_err(|_| CookieError::Encoding)?;

        // The username may itself contain '|'; the other two segments cannot
        let mut segments = decoded.rsplitn(3, '|');
        let (Some(signature), Some(expiry), Some(username)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(CookieError::Format);
        };

        let expires = NaiveDateTime::parse_from_str(expiry, EXPIRY_FORMAT)
            .map_err(|_| CookieError::Expiry)?
            .and_utc();

        let signature = STANDARD
            .decode(signature)
            .map_err(|_| CookieError::Signature)?;
        mac(secret, username, expiry)?
            .verify_slice(&signature)
            .map_err(|_| CookieError::Signature)?;

        if expires <= now {
            return Err(CookieError::Expired);
        }

        Ok(Self {
            username: username.to_string(),
            expires,
        })
    }
}

/// Outcome of the cookie bridge.
pub enum CookieGrant {
    /// Set the session and CSRF cookies, then redirect.
    Granted {
        cookie: SessionCookie,
        set_cookies: Vec<String>,
        location: String,
    },
    /// Refuse without setting any cookie.
    Denied,
}

impl CookieGrant {
    pub fn is_granted(&self) -> bool {
        matches!(self, CookieGrant::Granted { .. })
    }
}

impl fmt::Debug for CookieGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookieGrant::Granted {
                cookie, location, ..
            } => f
                .debug_struct("Granted")
                .field("cookie", cookie)
                .field("location", location)
                .finish_non_exhaustive(),
            CookieGrant::Denied => f.write_str("Denied"),
        }
    }
}

impl IntoResponse for CookieGrant {
    fn into_response(self) -> Response {
        match self {
            CookieGrant::Granted {
                set_cookies,
                location,
                ..
            } => {
                let mut response = StatusCode::FOUND.into_response();
                let headers = response.headers_mut();
                match HeaderValue::from_str(&location) {
                    Ok(value) => {
                        headers.insert(header::LOCATION, value);
                    }
                    Err(e) => {
                        tracing::error!(target: "edge.bridge", error = %e, "Sign-in redirect is not a valid header value");
                        return GatewayError::Internal.into_response();
                    }
                }
                for cookie in set_cookies {
                    match HeaderValue::from_str(&cookie) {
                        Ok(value) => {
                            headers.append(header::SET_COOKIE, value);
                        }
                        Err(e) => {
                            tracing::error!(target: "edge.bridge", error = %e, "Cookie is not a valid header value");
                            return GatewayError::Internal.into_response();
                        }
                    }
                }
                response
            }
            CookieGrant::Denied => GatewayError::Unauthenticated.into_response(),
        }
    }
}

/// Settings for [`CookieBridge`].
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub cookie_name: String,
    pub validity: TimeDelta,
    /// Account placed in the cookie; the verified subject when `None`.
    pub username: Option<String>,
    pub redirect: String,
    pub csrf_domain: Option<String>,
}

/// Mints an HMAC session cookie for a verified identity.
pub struct CookieBridge {
    secret: SecretString,
    settings: CookieSettings,
}

impl CookieBridge {
    pub fn new(secret: SecretString, settings: CookieSettings) -> Self {
        Self { secret, settings }
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    fn session_set_cookie(&self, value: &str) -> String {
        format!("{}={value}; Path=/; HttpOnly", self.settings.cookie_name)
    }

    /// Scope attributes of the CSRF cookie; setting and clearing must agree
    /// or the browser keeps the original.
    fn csrf_attributes(&self) -> String {
        match &self.settings.csrf_domain {
            Some(domain) => format!("Domain={domain}; Path=/"),
            None => "Path=/".to_string(),
        }
    }

    fn csrf_set_cookie(&self) -> String {
        let token = uuid::Uuid::new_v4();
        format!("{CSRF_COOKIE_NAME}={token}; {}", self.csrf_attributes())
    }

    /// `Set-Cookie` values that expire the session and CSRF cookies.
    pub fn clearing_cookies(&self) -> Vec<String> {
        const EXPIRED: &str = "Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT";
        vec![
            format!("{}=; Path=/; {EXPIRED}", self.settings.cookie_name),
            format!("{CSRF_COOKIE_NAME}=; {}; {EXPIRED}", self.csrf_attributes()),
        ]
    }
}

impl SessionBridge for CookieBridge {
    type Credential = CookieGrant;

    fn backend(&self) -> &'static str {
        "cookie"
    }

    fn bridge(&self, result: VerificationResult) -> CookieGrant {
        record_outcome(self.backend(), &result);
        let Ok(identity) = result else {
            return CookieGrant::Denied;
        };

        let username = self
            .settings
            .username
            .clone()
            .unwrap_or(identity.subject);
        let cookie = SessionCookie::mint(username, self.settings.validity, Utc::now());
        let value = match cookie.encode(&self.secret) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(target: "edge.bridge", error = %e, "Failed to sign session cookie");
                return CookieGrant::Denied;
            }
        };

        CookieGrant::Granted {
            cookie,
            set_cookies: vec![self.session_set_cookie(&value), self.csrf_set_cookie()],
            location: self.settings.redirect.clone(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::auth::claims::{OidcClaims, VerifiedIdentity};
    use crate::auth::failure::AuthFailure;
    use chrono::TimeZone;

    fn secret() -> SecretString {
        SecretString::from("S".to_string())
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn identity(subject: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: subject.to_string(),
            key_id: "kid-1".to_string(),
            claims: OidcClaims {
                sub: subject.to_string(),
                exp: 0,
                iss: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    fn bridge(username: Option<&str>, csrf_domain: Option<&str>) -> CookieBridge {
        CookieBridge::new(
            secret(),
            CookieSettings {
                cookie_name: "user-id".to_string(),
                validity: TimeDelta::days(30),
                username: username.map(str::to_string),
                redirect: "/rstudio/".to_string(),
                csrf_domain: csrf_domain.map(str::to_string),
            },
        )
    }

    // =========================================================================
    // SessionCookie
    // =========================================================================

    #[test]
    fn test_encode_matches_known_layout() {
        let cookie = SessionCookie::mint("alice", TimeDelta::days(30), fixed_now());
        let value = cookie.encode(&secret()).unwrap();

        assert!(value.starts_with("alice|Sun%2C%2031%20Mar%202024%2012%3A00%3A00%20GMT|"));
        assert!(!value.contains('/'));
        assert!(!value.contains('+'));
        assert!(!value.contains(' '));
    }

    #[test]
    fn test_minted_cookie_verifies() {
        let now = fixed_now();
        let value = SessionCookie::mint("alice", TimeDelta::days(30), now).encode(&secret()).unwrap();

        let parsed = SessionCookie::verify(&value, &secret(), now).unwrap();

        assert_eq!(parsed.username, "alice");
        assert!(parsed.expires > now);
        assert_eq!(parsed.expires, now + TimeDelta::days(30));
    }

    #[test]
    fn test_tampering_any_segment_is_rejected() {
        let now = fixed_now();
        let value = SessionCookie::mint("alice", TimeDelta::days(30), now).encode(&secret()).unwrap();
        let other_expiry = "Mon%2C%2001%20Apr%202024%2012%3A00%3A00%20GMT";

        let mut segments = value.splitn(3, '|');
        let (user, expiry, signature) = (
            segments.next().unwrap(),
            segments.next().unwrap(),
            segments.next().unwrap(),
        );

        let tampered = [
            format!("mallory|{expiry}|{signature}"),
            format!("{user}|{other_expiry}|{signature}"),
            format!("{user}|{expiry}|{}", STANDARD.encode([0u8; 32])),
        ];
        for value in tampered {
            let result = SessionCookie::verify(&value, &secret(), now);
            assert_eq!(result.unwrap_err(), CookieError::Signature, "{value}");
        }
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let now = fixed_now();
        let value = SessionCookie::mint("alice", TimeDelta::days(30), now).encode(&secret()).unwrap();

        let result = SessionCookie::verify(&value, &SecretString::from("other".to_string()), now);
        assert_eq!(result.unwrap_err(), CookieError::Signature);
    }

    #[test]
    fn test_expired_cookie_is_rejected() {
        let now = fixed_now();
        let value = SessionCookie::mint("alice", TimeDelta::days(1), now).encode(&secret()).unwrap();

        let result = SessionCookie::verify(&value, &secret(), now + TimeDelta::days(2));
        assert_eq!(result.unwrap_err(), CookieError::Expired);
    }

    #[test]
    fn test_malformed_values() {
        assert_eq!(
            SessionCookie::verify("alice", &secret(), fixed_now()).unwrap_err(),
            CookieError::Format
        );
        assert_eq!(
            SessionCookie::verify("alice|yesterday|abc", &secret(), fixed_now()).unwrap_err(),
            CookieError::Expiry
        );
    }

    #[test]
    fn test_username_with_special_characters() {
        let now = fixed_now();
        let value = SessionCookie::mint("a|b c@d/e", TimeDelta::days(1), now).encode(&secret()).unwrap();

        let parsed = SessionCookie::verify(&value, &secret(), now).unwrap();
        assert_eq!(parsed.username, "a|b c@d/e");
    }

    #[test]
    fn test_debug_redacts_username() {
        let cookie = SessionCookie::mint("alice", TimeDelta::days(1), fixed_now());
        assert!(!format!("{cookie:?}").contains("alice"));
    }

    // =========================================================================
    // CookieBridge
    // =========================================================================

    #[test]
    fn test_success_mints_cookie_for_subject() {
        let grant = bridge(None, None).bridge(Ok(identity("alice")));

        let CookieGrant::Granted {
            cookie,
            set_cookies,
            location,
        } = grant
        else {
            panic!("expected a granted cookie");
        };

        assert_eq!(cookie.username, "alice");
        assert_eq!(location, "/rstudio/");
        assert_eq!(set_cookies.len(), 2);
        assert!(set_cookies[0].starts_with("user-id=alice|"));
        assert!(set_cookies[1].starts_with("csrf-token="));
    }

    #[test]
    fn test_fixed_username_overrides_subject() {
        let grant = bridge(Some("rstudio"), None).bridge(Ok(identity("alice")));

        let CookieGrant::Granted { cookie, .. } = grant else {
            panic!("expected a granted cookie");
        };
        assert_eq!(cookie.username, "rstudio");
    }

    #[test]
    fn test_cookie_validity_ignores_token_expiry() {
        // identity() carries exp = 0, long in the past
        let grant = bridge(None, None).bridge(Ok(identity("alice")));

        let CookieGrant::Granted { cookie, .. } = grant else {
            panic!("expected a granted cookie");
        };
        assert!(cookie.expires > Utc::now() + TimeDelta::days(29));
    }

    #[test]
    fn test_csrf_domain() {
        let grant = bridge(None, Some(".example.org")).bridge(Ok(identity("alice")));

        let CookieGrant::Granted { set_cookies, .. } = grant else {
            panic!("expected a granted cookie");
        };
        assert!(set_cookies[1].contains("Domain=.example.org"));
    }

    #[test]
    fn test_failure_is_denied_without_cookie() {
        for failure in [AuthFailure::MissingToken, AuthFailure::ExpiredToken] {
            let grant = bridge(None, None).bridge(Err(failure));
            assert!(!grant.is_granted());

            let response = grant.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().get(header::SET_COOKIE).is_none());
        }
    }

    #[test]
    fn test_granted_response() {
        let response = bridge(None, None)
            .bridge(Ok(identity("alice")))
            .into_response();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/rstudio/");
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_clearing_cookies() {
        let cookies = bridge(None, None).clearing_cookies();
        assert!(cookies[0].starts_with("user-id=;"));
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn test_clearing_csrf_cookie_keeps_domain() {
        let scoped = bridge(None, Some(".example.org"));
        let CookieGrant::Granted { set_cookies, .. } = scoped.bridge(Ok(identity("alice"))) else {
            panic!("expected a granted cookie");
        };
        let cleared = scoped.clearing_cookies();

        let scope = |cookie: &str| cookie.split_once("; ").unwrap().1.to_string();
        assert!(cleared[1].starts_with("csrf-token=;"));
        assert!(scope(cleared[1].as_str()).starts_with(&scope(set_cookies[1].as_str())));
        assert!(cleared[1].contains("Domain=.example.org"));

        let unscoped = bridge(None, None).clearing_cookies();
        assert!(!unscoped[1].contains("Domain="));
    }
}
