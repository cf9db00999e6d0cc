//! Identity-token utilities shared by every edge front end.
//!
//! The load balancer forwards a signed ES256 token in which the header carries
//! the key identifier and a few ALB-specific fields. This module decodes that
//! header *without* verifying anything, so the caller can pick a key.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The `kid` is only ever used to select a key; it is restricted to a URL-safe
//!   charset because it is appended to the key-distribution URL
//! - Nothing decoded here is trusted until the signature has been verified
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_unverified_header, normalize_padding};
//!
//! let token = normalize_padding(raw);
//! let header = decode_unverified_header(&token)?;
//! let key = resolver.resolve(&header.kid).await?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed token size in bytes (8KB).
///
/// Load-balancer tokens are typically well under 2KB. Anything larger is
/// rejected before base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Maximum accepted length of a key identifier.
pub const MAX_KID_LENGTH: usize = 128;

/// Default leeway applied to `exp` validation.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Upper bound on configurable leeway (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while reading the unverified token header.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("token exceeds {MAX_JWT_SIZE_BYTES} bytes")]
    TokenTooLarge,

    /// Token is not three dot-separated segments, or the header is not base64url JSON.
    #[error("token is not a well-formed JWT")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("token header has no key id")]
    MissingKid,

    /// Header `kid` contains characters that cannot be used for key lookup.
    #[error("token header key id is not URL-safe")]
    InvalidKid,
}

// =============================================================================
// Header Types
// =============================================================================

/// Unverified token header as emitted by the load balancer.
///
/// `signer`, `iss`, `client` and `exp` are ALB extensions; other issuers
/// simply omit them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnverifiedHeader {
    /// Signing algorithm claimed by the token (informational only).
    #[serde(default)]
    pub alg: Option<String>,

    /// Key identifier, already validated by [`is_valid_kid`].
    pub kid: String,

    /// ARN of the load balancer that signed the token.
    #[serde(default)]
    pub signer: Option<String>,

    /// Issuer of the upstream identity provider.
    #[serde(default)]
    pub iss: Option<String>,

    /// OAuth client id the load balancer used upstream.
    #[serde(default)]
    pub client: Option<String>,

    /// Header-level expiry (Unix epoch seconds).
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Raw header shape before the kid has been checked.
#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    signer: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    client: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

// =============================================================================
// Functions
// =============================================================================

/// Strip base64 `=` padding from every segment of a token.
///
/// ALB emits padded base64url segments, which strict decoders reject. Returns
/// the input unchanged (borrowed) when there is no padding.
#[must_use]
pub fn normalize_padding(token: &str) -> Cow<'_, str> {
    if !token.contains('=') {
        return Cow::Borrowed(token);
    }

    let normalized = token
        .split('.')
        .map(|segment| segment.trim_end_matches('='))
        .collect::<Vec<_>>()
        .join(".");
    Cow::Owned(normalized)
}

/// Whether `kid` is safe to append to the key-distribution URL.
#[must_use]
pub fn is_valid_kid(kid: &str) -> bool {
    !kid.is_empty()
        && kid.len() <= MAX_KID_LENGTH
        && kid != "."
        && kid != ".."
        && kid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Decode the header segment of a token without verifying the signature.
///
/// Padding is tolerated. The token MUST still be verified after the key has
/// been resolved.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong segment count, bad base64, or header is not JSON
/// - `MissingKid` - header has no `kid`, or it is not a non-empty string
/// - `InvalidKid` - `kid` contains characters outside `[A-Za-z0-9._-]`
pub fn decode_unverified_header(token: &str) -> Result<UnverifiedHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_part.trim_end_matches('='))
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
            JwtValidationError::MalformedToken
        })?;

    let raw: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = raw
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(JwtValidationError::MissingKid)?;

    if !is_valid_kid(kid) {
        tracing::debug!(target: "common.jwt", "Token rejected: kid is not URL-safe");
        return Err(JwtValidationError::InvalidKid);
    }

    Ok(UnverifiedHeader {
        alg: raw.alg,
        kid: kid.to_string(),
        signer: raw.signer,
        iss: raw.iss,
        client: raw.client,
        exp: raw.exp,
    })
}

/// Extract only the `kid` from a token header.
///
/// # Errors
///
/// Same as [`decode_unverified_header`].
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    decode_unverified_header(token).map(|header| header.kid)
}

// =============================================================================
// Tests
// =============================================================================
