//! Push delivery domain models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Push delivery technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Browser Web Push (RFC 8030).
    Web,
    /// Native mobile push through the Expo gateway.
    Mobile,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown push channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Channel::Web),
            "mobile" => Ok(Channel::Mobile),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// Browser-side keys of a Web Push subscription (base64url).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebKeys {
    /// P-256 ECDH public key.
    pub p256dh: String,
    /// 16-byte auth secret.
    pub auth: String,
}

/// Where a push goes, per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointTarget {
    Web {
        endpoint: String,
        keys: WebKeys,
        user_agent: Option<String>,
    },
    Mobile {
        token: String,
    },
}

impl EndpointTarget {
    pub fn channel(&self) -> Channel {
        match self {
            EndpointTarget::Web { .. } => Channel::Web,
            EndpointTarget::Mobile { .. } => Channel::Mobile,
        }
    }

    /// Globally unique identity within the channel: endpoint URL or push token.
    pub fn identity(&self) -> &str {
        match self {
            EndpointTarget::Web { endpoint, .. } => endpoint,
            EndpointTarget::Mobile { token } => token,
        }
    }
}

/// A registered device on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEndpoint {
    pub id: String,
    pub user_id: String,
    pub target: EndpointTarget,
    pub active: bool,
}

impl PushEndpoint {
    pub fn channel(&self) -> Channel {
        self.target.channel()
    }

    pub fn identity(&self) -> &str {
        self.target.identity()
    }
}

/// One logical notification, built per dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Identifies the logical event so clients can collapse duplicates.
    pub event_key: String,
    pub title: String,
    pub body: String,
    /// Deep-link data for the client. Always a JSON object.
    pub data: Value,
    /// Path or URL to open when the notification is tapped.
    pub url: Option<String>,
}

impl NotificationPayload {
    pub fn new(
        event_key: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            event_key: event_key.into(),
            title: title.into(),
            body: body.into(),
            data: Value::Object(Map::new()),
            url: None,
        }
    }

    /// Replace the data object. Non-object values are wrapped under `"value"`.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(_) => data,
            Value::Null => Value::Object(Map::new()),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                Value::Object(map)
            }
        };
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Data object as delivered to clients, with `eventKey` and `url` merged in.
    pub fn client_data(&self) -> Value {
        let mut map = match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.insert("eventKey".into(), Value::String(self.event_key.clone()));
        if let Some(url) = &self.url {
            map.insert("url".into(), Value::String(url.clone()));
        }
        Value::Object(map)
    }
}
