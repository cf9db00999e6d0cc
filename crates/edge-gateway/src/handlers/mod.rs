//! HTTP request handlers for the edge gateway.
//!
//! Each front end is a thin adapter: extract the OIDC headers, run the shared
//! pipeline, hand the result to its session bridge.

pub mod health;
pub mod login;
pub mod me;
pub mod metrics;
pub mod sign_in;
pub mod sign_out;
pub mod tunnel;

pub use health::ping;
pub use login::login;
pub use me::get_me;
pub use metrics::metrics_handler;
pub use sign_in::sign_in;
pub use sign_out::sign_out;
pub use tunnel::{websockify, TunnelState};
