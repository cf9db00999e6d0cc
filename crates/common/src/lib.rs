//! Token-format utilities and secret handling shared by the edge gateway
//! front ends.

#![warn(clippy::pedantic)]

/// Module for unverified token header decoding, size limits and clock-skew constants
pub mod jwt;

/// Module for secret types and secret-file loading
pub mod secret;
