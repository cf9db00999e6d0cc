//! Edge authentication.
//!
//! Verifies the OIDC headers the load balancer injects and pins the container
//! to a single subject.
//!
//! # Components
//!
//! - `keys` - single-slot signing-key resolver
//! - `verifier` - token signature, expiry and subject checks
//! - `binding` - first-writer-wins container identity
//! - `memo` - memo of the last successful verification
//! - `pipeline` - the above, composed
//! - `headers` - request header extraction
//! - `claims` - verified claim types
//! - `failure` - failure taxonomy

pub mod binding;
pub mod claims;
pub mod failure;
pub mod headers;
pub mod keys;
pub mod memo;
pub mod pipeline;
pub mod verifier;

pub use binding::{BindingStore, FileBindingStore, IdentityBinder, StaticBindingStore};
pub use claims::{OidcClaims, VerifiedIdentity};
pub use failure::{AuthFailure, Severity};
pub use headers::OidcHeaders;
pub use keys::KeyResolver;
pub use memo::VerificationCache;
pub use pipeline::EdgeAuthenticator;
pub use verifier::{TokenVerifier, VerificationResult};
