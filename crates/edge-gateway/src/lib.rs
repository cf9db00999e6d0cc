//! Edge OIDC verification and session bridging.
//!
//! Sits behind an AWS Application Load Balancer that authenticates users
//! with an OIDC provider and forwards `x-amzn-oidc-*` headers. This crate
//! verifies those headers and turns the result into whatever each backend
//! understands.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> auth::EdgeAuthenticator -> bridge::*
//! ```
//!
//! # Modules
//!
//! - `auth` - key resolution, token verification, identity binding, memo
//! - `bridge` - per-backend session bridges
//! - `config` - configuration from environment
//! - `errors` - HTTP-facing error type
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP middleware
//! - `observability` - metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
