//! Observability for the edge gateway.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
