// @zen-component: CFG-ProcessConfig
//
//! Process-wide configuration read from the environment.
//!
//! | Variable                    | Default                                  | Missing        |
//! |-----------------------------|------------------------------------------|----------------|
//! | `JWT_SECRET` / `AUTH_SECRET`| none                                      | fatal          |
//! | `ACCESS_TOKEN_TTL_SECS`     | `3600`                                   |                |
//! | `REFRESH_TOKEN_TTL_DAYS`    | `30`                                     |                |
//! | `REFRESH_TOKEN_ROTATION`    | `true`                                   |                |
//! | `REFRESH_TOKEN_RETENTION_DAYS` | `7`                                   |                |
//! | `REFRESH_TOKEN_REUSE_GRACE_SECS` | `10`                                |                |
//! | `VAPID_PUBLIC_KEY`          | none                                      | web disabled   |
//! | `VAPID_PRIVATE_KEY`         | none                                      | web disabled   |
//! | `VAPID_SUBJECT`             | none                                      | web disabled   |
//! | `WEB_PUSH_TTL_SECS`         | `86400`                                  |                |
//! | `EXPO_ACCESS_TOKEN`         | none                                      | mobile disabled|
//! | `EXPO_PUSH_URL`             | `https://exp.host/--/api/v2/push/send`   |                |
//! | `PUSH_MAX_CONCURRENCY`      | `20`                                     |                |
//! | `PUSH_SEND_TIMEOUT_SECS`    | `5`                                      |                |

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::jwt::{DEFAULT_ACCESS_TOKEN_TTL_SECS, resolve_signing_secret};
use crate::auth::refresh::DEFAULT_REFRESH_TOKEN_TTL_DAYS;
use crate::push::mobile::EXPO_PUSH_URL;

/// Default retention of expired refresh tokens before garbage collection.
pub const DEFAULT_REFRESH_TOKEN_RETENTION_DAYS: i64 = 7;

/// Default window in which a just-rotated refresh token presented again is
/// treated as a concurrent refresh rather than a replay.
pub const DEFAULT_REFRESH_TOKEN_REUSE_GRACE_SECS: i64 = 10;

const ACCESS_TOKEN_TTL_SECS_RANGE: RangeInclusive<i64> = 1..=30 * 86_400;
const REFRESH_TOKEN_TTL_DAYS_RANGE: RangeInclusive<i64> = 1..=3650;
const REFRESH_TOKEN_RETENTION_DAYS_RANGE: RangeInclusive<i64> = 0..=3650;
const REFRESH_TOKEN_REUSE_GRACE_SECS_RANGE: RangeInclusive<i64> = 0..=300;

/// Default Web Push message TTL at the push service: 24 hours.
pub const DEFAULT_WEB_PUSH_TTL_SECS: u32 = 86_400;

/// Default bound on concurrent push sends across the process.
pub const DEFAULT_PUSH_MAX_CONCURRENCY: usize = 20;

/// Default per-send timeout.
pub const DEFAULT_PUSH_SEND_TIMEOUT_SECS: u64 = 5;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Read a non-empty env var.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an env var, falling back to `default` when unset.
fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env_non_empty(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn check_range(
    name: &'static str,
    value: i64,
    range: RangeInclusive<i64>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_non_empty(name) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value }),
        },
    }
}

/// Session token settings.
#[derive(Clone)]
pub struct SessionConfig {
    /// HS256 signing secret for access tokens.
    pub signing_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_days: i64,
    /// Revoke the presented refresh token and issue a new one on every refresh.
    pub rotate_on_use: bool,
    /// How long expired refresh tokens are kept before purging.
    pub refresh_retention_days: i64,
    /// Seconds after a rotation during which the rotated token may be presented
    /// again without revoking every session of the user.
    pub reuse_grace_secs: i64,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("signing_secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("rotate_on_use", &self.rotate_on_use)
            .field("refresh_retention_days", &self.refresh_retention_days)
            .field("reuse_grace_secs", &self.reuse_grace_secs)
            .finish()
    }
}

impl SessionConfig {
    /// Defaults around an explicit secret.
    pub fn with_secret(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            access_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            rotate_on_use: true,
            refresh_retention_days: DEFAULT_REFRESH_TOKEN_RETENTION_DAYS,
            reuse_grace_secs: DEFAULT_REFRESH_TOKEN_REUSE_GRACE_SECS,
        }
    }

    /// Read from the environment. A missing signing secret or an out-of-range
    /// lifetime is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = resolve_signing_secret().map_err(|e| ConfigError::Missing(e.to_string()))?;
        let config = Self {
            signing_secret: secret,
            access_ttl_secs: env_parse("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TOKEN_TTL_SECS)?,
            refresh_ttl_days: env_parse("REFRESH_TOKEN_TTL_DAYS", DEFAULT_REFRESH_TOKEN_TTL_DAYS)?,
            rotate_on_use: env_bool("REFRESH_TOKEN_ROTATION", true)?,
            refresh_retention_days: env_parse(
                "REFRESH_TOKEN_RETENTION_DAYS",
                DEFAULT_REFRESH_TOKEN_RETENTION_DAYS,
            )?,
            reuse_grace_secs: env_parse(
                "REFRESH_TOKEN_REUSE_GRACE_SECS",
                DEFAULT_REFRESH_TOKEN_REUSE_GRACE_SECS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Lifetimes must be positive and small enough to add to a timestamp.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "ACCESS_TOKEN_TTL_SECS",
            self.access_ttl_secs,
            ACCESS_TOKEN_TTL_SECS_RANGE,
        )?;
        check_range(
            "REFRESH_TOKEN_TTL_DAYS",
            self.refresh_ttl_days,
            REFRESH_TOKEN_TTL_DAYS_RANGE,
        )?;
        check_range(
            "REFRESH_TOKEN_RETENTION_DAYS",
            self.refresh_retention_days,
            REFRESH_TOKEN_RETENTION_DAYS_RANGE,
        )?;
        check_range(
            "REFRESH_TOKEN_REUSE_GRACE_SECS",
            self.reuse_grace_secs,
            REFRESH_TOKEN_REUSE_GRACE_SECS_RANGE,
        )
    }
}

/// Web Push (VAPID) settings. Every field optional; missing keys disable the channel.
#[derive(Clone)]
pub struct WebPushConfig {
    /// Base64url uncompressed P-256 public key (65 bytes decoded).
    pub public_key: Option<String>,
    /// Base64url raw P-256 private scalar (32 bytes decoded).
    pub private_key: Option<String>,
    /// VAPID contact, `mailto:` or `https:` URI.
    pub subject: Option<String>,
    pub ttl_secs: u32,
}

impl fmt::Debug for WebPushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebPushConfig")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("subject", &self.subject)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl Default for WebPushConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            private_key: None,
            subject: None,
            ttl_secs: DEFAULT_WEB_PUSH_TTL_SECS,
        }
    }
}

impl WebPushConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            public_key: env_non_empty("VAPID_PUBLIC_KEY"),
            private_key: env_non_empty("VAPID_PRIVATE_KEY"),
            subject: env_non_empty("VAPID_SUBJECT"),
            ttl_secs: env_parse("WEB_PUSH_TTL_SECS", DEFAULT_WEB_PUSH_TTL_SECS)?,
        })
    }
}

/// Expo mobile push settings.
#[derive(Clone)]
pub struct MobilePushConfig {
    pub access_token: Option<String>,
    pub push_url: String,
}

impl fmt::Debug for MobilePushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MobilePushConfig")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("push_url", &self.push_url)
            .finish()
    }
}

impl Default for MobilePushConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            push_url: EXPO_PUSH_URL.to_string(),
        }
    }
}

impl MobilePushConfig {
    pub fn from_env() -> Self {
        Self {
            access_token: env_non_empty("EXPO_ACCESS_TOKEN"),
            push_url: env_non_empty("EXPO_PUSH_URL").unwrap_or_else(|| EXPO_PUSH_URL.to_string()),
        }
    }
}

/// Dispatcher limits.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Process-wide bound on in-flight sends.
    pub max_concurrency: usize,
    /// Bound on a single adapter call.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_PUSH_MAX_CONCURRENCY,
            send_timeout: Duration::from_secs(DEFAULT_PUSH_SEND_TIMEOUT_SECS),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_concurrency: usize =
            env_parse("PUSH_MAX_CONCURRENCY", DEFAULT_PUSH_MAX_CONCURRENCY)?;
        if max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "PUSH_MAX_CONCURRENCY",
                value: "0".into(),
            });
        }
        let timeout_secs: u64 = env_parse("PUSH_SEND_TIMEOUT_SECS", DEFAULT_PUSH_SEND_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PUSH_SEND_TIMEOUT_SECS",
                value: "0".into(),
            });
        }
        Ok(Self {
            max_concurrency,
            send_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Everything the push side needs.
#[derive(Debug, Clone, Default)]
pub struct PushConfig {
    pub web: WebPushConfig,
    pub mobile: MobilePushConfig,
    pub dispatch: DispatchConfig,
}

impl PushConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            web: WebPushConfig::from_env()?,
            mobile: MobilePushConfig::from_env(),
            dispatch: DispatchConfig::from_env()?,
        })
    }
}
