//! Load-balancer OIDC request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;
use std::fmt;

/// Subject the load balancer claims for the request.
pub const IDENTITY_HEADER: &str = "x-amzn-oidc-identity";

/// Signed identity token.
pub const TOKEN_HEADER: &str = "x-amzn-oidc-data";

/// Upstream access token. Never used for verification.
pub const ACCESS_TOKEN_HEADER: &str = "x-amzn-oidc-accesstoken";

/// The three OIDC headers, as received.
///
/// Extraction never fails: absent or non-UTF-8 headers become `None` and the
/// verifier decides what that means.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OidcHeaders {
    pub identity: Option<String>,
    pub token: Option<String>,
    pub access_token: Option<String>,
}

impl OidcHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            identity: get(IDENTITY_HEADER),
            token: get(TOKEN_HEADER),
            access_token: get(ACCESS_TOKEN_HEADER),
        }
    }
}

impl fmt::Debug for OidcHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcHeaders")
            .field("identity", &self.identity.as_ref().map(|_| "[REDACTED]"))
            .field("token", &self.token.as_ref().map(|t| t.len()))
            .field("access_token", &self.access_token.as_ref().map(|t| t.len()))
            .finish()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for OidcHeaders
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
