// @zen-component: PUSH-SubscriptionRegistry
//
//! Registration of push endpoints per user.

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use super::PushError;
use super::mobile::is_expo_push_token;
use crate::models::push::{Channel, EndpointTarget, PushEndpoint, WebKeys};
use crate::store::CredentialStore;

/// Normalizes endpoint registration across both channels.
#[derive(Clone)]
pub struct PushRegistry {
    store: Arc<dyn CredentialStore>,
}

impl PushRegistry {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Register (or re-register) a browser subscription for `user_id`.
    ///
    /// The endpoint URL is the identity: registering it again overwrites the
    /// keys and owner and reactivates it.
    pub async fn register_web(
        &self,
        user_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        user_agent: Option<&str>,
    ) -> Result<(), PushError> {
        let endpoint = endpoint.trim();
        let p256dh = p256dh.trim();
        let auth = auth.trim();

        if p256dh.is_empty() || auth.is_empty() {
            return Err(PushError::InvalidSubscription(
                "subscription keys p256dh and auth are required".into(),
            ));
        }
        validate_endpoint_url(endpoint)?;

        let target = EndpointTarget::Web {
            endpoint: endpoint.to_string(),
            keys: WebKeys {
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
            },
            user_agent: user_agent
                .map(str::trim)
                .filter(|ua| !ua.is_empty())
                .map(str::to_string),
        };
        self.store.upsert_push_endpoint(user_id, &target).await?;
        info!(user_id, channel = %Channel::Web, "push endpoint registered");
        Ok(())
    }

    /// Register an Expo push token for `user_id`.
    ///
    /// Tokens that are not Expo-shaped are ignored and `false` is returned.
    pub async fn register_mobile(&self, user_id: &str, token: &str) -> Result<bool, PushError> {
        let token = token.trim();
        if !is_expo_push_token(token) {
            debug!(user_id, "ignoring malformed Expo push token");
            return Ok(false);
        }
        let target = EndpointTarget::Mobile {
            token: token.to_string(),
        };
        self.store.upsert_push_endpoint(user_id, &target).await?;
        info!(user_id, channel = %Channel::Mobile, "push endpoint registered");
        Ok(true)
    }

    /// Stop delivering to an endpoint without forgetting it. Idempotent.
    pub async fn deactivate(&self, channel: Channel, identity: &str) -> Result<bool, PushError> {
        Ok(self
            .store
            .set_push_endpoint_active(channel, identity, false)
            .await?)
    }

    /// Forget one of `user_id`'s endpoints. Removing an unknown endpoint, or
    /// one registered to another user, is not an error and removes nothing.
    pub async fn unsubscribe(
        &self,
        user_id: &str,
        channel: Channel,
        identity: &str,
    ) -> Result<bool, PushError> {
        let removed = self
            .store
            .delete_push_endpoint(user_id, channel, identity.trim())
            .await?;
        debug!(user_id, %channel, removed, "push endpoint unsubscribed");
        Ok(removed)
    }

    pub async fn list_active_endpoints(&self, user_id: &str) -> Result<Vec<PushEndpoint>, PushError> {
        Ok(self.store.list_active_push_endpoints(user_id).await?)
    }
}

fn validate_endpoint_url(endpoint: &str) -> Result<(), PushError> {
    let url = Url::parse(endpoint)
        .map_err(|e| PushError::InvalidSubscription(format!("endpoint is not a URL: {e}")))?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(PushError::InvalidSubscription(
            "endpoint must be an absolute http(s) URL".into(),
        ));
    }
    Ok(())
}
