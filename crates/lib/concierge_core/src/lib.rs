//! # concierge_core
//!
//! Session tokens and push notification delivery for Concierge.

pub mod auth;
pub mod config;
pub mod models;
pub mod push;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
