//! HTTP middleware for the edge gateway.
//!
//! - `http_metrics` - request metrics for every response

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
