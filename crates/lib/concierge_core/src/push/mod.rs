// @zen-component: PUSH-ChannelAdapter
//
//! Push notification delivery.
//!
//! - [`registry`]: registration and removal of device endpoints.
//! - [`dispatcher`]: fanout of one payload to every live endpoint of a user.
//! - [`web`] / [`mobile`]: the two [`PushChannel`] adapters.
//! - [`events`]: payload builders for the business events that notify.

pub mod dispatcher;
pub mod events;
pub mod mobile;
pub mod registry;
pub mod web;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::PushConfig;
use crate::models::push::{Channel, NotificationPayload, PushEndpoint};
use crate::store::StoreError;
use mobile::ExpoChannel;
use web::WebPushChannel;

/// Registry errors.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a send to one endpoint did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The endpoint is gone for good and should be deactivated.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    /// Worth trying again on a later notification.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// Outcome of one endpoint within a [`PushChannel::send`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Endpoint identity (URL or push token) the report refers to.
    pub identity: String,
    pub result: Result<(), DeliveryFailure>,
}

impl SendReport {
    pub fn delivered(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            result: Ok(()),
        }
    }

    pub fn failed(identity: impl Into<String>, failure: DeliveryFailure) -> Self {
        Self {
            identity: identity.into(),
            result: Err(failure),
        }
    }
}

/// One delivery technology.
///
/// Adapters never fail as a whole: every problem is reported per endpoint.
#[async_trait]
pub trait PushChannel: Send + Sync {
    fn channel(&self) -> Channel;

    /// Largest number of endpoints a single [`send`](PushChannel::send) accepts.
    fn max_batch_size(&self) -> usize;

    /// Whether `endpoint` can be sent to at all. Invalid endpoints are skipped.
    fn is_valid_endpoint(&self, endpoint: &PushEndpoint) -> bool;

    /// Send `payload` to a batch of endpoints, returning one report per endpoint.
    async fn send(&self, endpoints: &[PushEndpoint], payload: &NotificationPayload)
    -> Vec<SendReport>;
}

/// The channel adapters that could be built from configuration.
#[derive(Default)]
pub struct ChannelSet {
    pub web: Option<Arc<WebPushChannel>>,
    pub mobile: Option<Arc<ExpoChannel>>,
}

impl ChannelSet {
    /// Build every adapter whose configuration is complete. Missing or
    /// invalid configuration leaves that channel out with a warning.
    pub fn from_config(config: &PushConfig, client: reqwest::Client) -> Self {
        let set = Self {
            web: WebPushChannel::from_config(&config.web, client.clone()).map(Arc::new),
            mobile: ExpoChannel::from_config(&config.mobile, client).map(Arc::new),
        };
        if set.web.is_none() && set.mobile.is_none() {
            warn!("no push channel configured, notifications will not be delivered");
        }
        set
    }

    /// VAPID application server key handed to browsers, when web push is on.
    pub fn vapid_public_key(&self) -> Option<String> {
        self.web.as_ref().map(|web| web.public_key().to_string())
    }

    pub fn into_channels(self) -> Vec<Arc<dyn PushChannel>> {
        let mut channels: Vec<Arc<dyn PushChannel>> = Vec::new();
        if let Some(web) = self.web {
            channels.push(web);
        }
        if let Some(mobile) = self.mobile {
            channels.push(mobile);
        }
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MobilePushConfig, WebPushConfig};
    use crate::push::web::VapidKeys;

    #[test]
    fn empty_config_builds_no_channels() {
        let set = ChannelSet::from_config(&PushConfig::default(), reqwest::Client::new());
        assert!(set.vapid_public_key().is_none());
        assert!(set.into_channels().is_empty());
    }

    #[test]
    fn complete_config_builds_both_channels() {
        let keys = VapidKeys::generate();
        let config = PushConfig {
            web: WebPushConfig {
                public_key: Some(keys.public_key_base64url().to_string()),
                private_key: Some(keys.private_key_base64url().to_string()),
                subject: Some("mailto:ops@example.com".into()),
                ..WebPushConfig::default()
            },
            mobile: MobilePushConfig {
                access_token: Some("expo-access".into()),
                ..MobilePushConfig::default()
            },
            ..PushConfig::default()
        };
        let set = ChannelSet::from_config(&config, reqwest::Client::new());
        assert_eq!(
            set.vapid_public_key().as_deref(),
            Some(keys.public_key_base64url())
        );
        let channels: Vec<Channel> = set.into_channels().iter().map(|c| c.channel()).collect();
        assert_eq!(channels, vec![Channel::Web, Channel::Mobile]);
    }
}
