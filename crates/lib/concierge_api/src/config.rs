//! API server configuration.

use concierge_core::config::{ConfigError, PushConfig, SessionConfig};

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    pub session: SessionConfig,
    pub push: PushConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable    | Default          |
    /// |-------------|------------------|
    /// | `BIND_ADDR` | `127.0.0.1:3100` |
    ///
    /// Session and push variables are documented in
    /// [`concierge_core::config`]. A missing signing secret is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            session: SessionConfig::from_env()?,
            push: PushConfig::from_env()?,
        })
    }
}
