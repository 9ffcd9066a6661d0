// @zen-component: PUSH-ExpoChannel
//
//! Native mobile push through the Expo push HTTP API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{DeliveryFailure, PushChannel, SendReport};
use crate::config::MobilePushConfig;
use crate::models::push::{Channel, EndpointTarget, NotificationPayload, PushEndpoint};

/// Expo push send endpoint.
pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Expo accepts at most 100 messages per request.
pub const EXPO_MAX_BATCH: usize = 100;

/// Ticket error meaning the app was uninstalled or the token revoked.
const DEVICE_NOT_REGISTERED: &str = "DeviceNotRegistered";

/// Whether `token` has the shape of an Expo push token.
///
/// Accepts `ExponentPushToken[…]` and `ExpoPushToken[…]` with a non-empty
/// inner part, and bare UUID-shaped tokens (8-4-4-4-12 alphanumerics).
pub fn is_expo_push_token(token: &str) -> bool {
    let bracketed = ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .filter_map(|prefix| token.strip_prefix(prefix))
        .filter_map(|rest| rest.strip_suffix(']'))
        .any(|inner| !inner.is_empty());
    bracketed || is_uuid_shaped(token)
}

fn is_uuid_shaped(token: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    let parts: Vec<&str> = token.split('-').collect();
    parts.len() == GROUPS.len()
        && parts
            .iter()
            .zip(GROUPS)
            .all(|(part, len)| part.len() == len && part.bytes().all(|b| b.is_ascii_alphanumeric()))
}

#[derive(Debug, Serialize)]
struct ExpoMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: Value,
    sound: &'static str,
    priority: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Vec<ExpoTicket>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<ExpoTicketDetails>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicketDetails {
    #[serde(default)]
    error: Option<String>,
}

impl ExpoTicket {
    fn into_result(self) -> Result<(), DeliveryFailure> {
        if self.status == "ok" {
            return Ok(());
        }
        let code = self.details.and_then(|d| d.error);
        let reason = match (&code, self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message,
            (None, None) => format!("ticket status {}", self.status),
        };
        if code.as_deref() == Some(DEVICE_NOT_REGISTERED) {
            Err(DeliveryFailure::Permanent(reason))
        } else {
            Err(DeliveryFailure::Transient(reason))
        }
    }
}

/// Expo push adapter.
pub struct ExpoChannel {
    client: reqwest::Client,
    push_url: String,
    access_token: String,
}

impl ExpoChannel {
    pub fn new(
        client: reqwest::Client,
        push_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            push_url: push_url.into(),
            access_token: access_token.into(),
        }
    }

    /// Build from configuration, or `None` (with a warning) without an access token.
    pub fn from_config(config: &MobilePushConfig, client: reqwest::Client) -> Option<Self> {
        match config.access_token.as_deref() {
            Some(token) => Some(Self::new(client, &config.push_url, token)),
            None => {
                warn!("EXPO_ACCESS_TOKEN not set, mobile push disabled");
                None
            }
        }
    }

    async fn post_batch(
        &self,
        messages: &[ExpoMessage<'_>],
    ) -> Result<Vec<ExpoTicket>, DeliveryFailure> {
        let response = self
            .client
            .post(&self.push_url)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .json(messages)
            .send()
            .await
            .map_err(|e| DeliveryFailure::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeliveryFailure::Transient(format!(
                "Expo returned {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let parsed: ExpoResponse = response
            .json()
            .await
            .map_err(|e| DeliveryFailure::Transient(format!("malformed Expo response: {e}")))?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl PushChannel for ExpoChannel {
    fn channel(&self) -> Channel {
        Channel::Mobile
    }

    fn max_batch_size(&self) -> usize {
        EXPO_MAX_BATCH
    }

    fn is_valid_endpoint(&self, endpoint: &PushEndpoint) -> bool {
        match &endpoint.target {
            EndpointTarget::Mobile { token } => is_expo_push_token(token),
            EndpointTarget::Web { .. } => false,
        }
    }

    async fn send(
        &self,
        endpoints: &[PushEndpoint],
        payload: &NotificationPayload,
    ) -> Vec<SendReport> {
        let data = payload.client_data();
        let messages: Vec<ExpoMessage<'_>> = endpoints
            .iter()
            .map(|endpoint| ExpoMessage {
                to: endpoint.identity(),
                title: &payload.title,
                body: &payload.body,
                data: data.clone(),
                sound: "default",
                priority: "high",
            })
            .collect();

        let tickets = match self.post_batch(&messages).await {
            Ok(tickets) => tickets,
            Err(failure) => {
                warn!(endpoints = endpoints.len(), error = %failure, "Expo push request failed");
                return endpoints
                    .iter()
                    .map(|e| SendReport::failed(e.identity(), failure.clone()))
                    .collect();
            }
        };

        if tickets.len() != endpoints.len() {
            warn!(
                sent = endpoints.len(),
                tickets = tickets.len(),
                "Expo returned a ticket count that does not match the batch"
            );
        }

        // Tickets come back in message order.
        let mut tickets = tickets.into_iter();
        endpoints
            .iter()
            .map(|endpoint| {
                let result = match tickets.next() {
                    Some(ticket) => ticket.into_result(),
                    None => Err(DeliveryFailure::Transient("no ticket returned".into())),
                };
                debug!(token = endpoint.identity(), ok = result.is_ok(), "Expo push ticket");
                SendReport {
                    identity: endpoint.identity().to_string(),
                    result,
                }
            })
            .collect()
    }
}
