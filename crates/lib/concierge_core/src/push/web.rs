// @zen-component: PUSH-WebPushChannel
//
//! Browser Web Push (RFC 8030).
//!
//! Payloads are encrypted with `aes128gcm` (RFC 8291) and signed with VAPID
//! (RFC 8292) by the `web-push` crate; the HTTP request itself goes out
//! through `reqwest`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures::future::join_all;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use web_push::{ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder};

use super::{DeliveryFailure, PushChannel, SendReport};
use crate::config::WebPushConfig;
use crate::models::push::{Channel, EndpointTarget, NotificationPayload, PushEndpoint, WebKeys};

/// Longest `Topic` header a push service accepts.
pub const MAX_TOPIC_LEN: usize = 32;

const UNCOMPRESSED_POINT_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;
const PRIVATE_SCALAR_LEN: usize = 32;

/// Problems with a configured VAPID key pair.
#[derive(Debug, Error)]
pub enum VapidKeyError {
    #[error("VAPID {0} key is not valid base64url")]
    Encoding(&'static str),

    #[error("VAPID public key must be a 65-byte uncompressed P-256 point")]
    PublicKey,

    #[error("VAPID private key must be a 32-byte P-256 scalar")]
    PrivateKey,

    #[error("VAPID public key does not belong to the private key")]
    Mismatch,
}

/// VAPID key pair, both halves base64url without padding.
///
/// The private key is the raw 32-byte scalar, which is the form
/// `VapidSignatureBuilder::from_base64` accepts.
#[derive(Clone)]
pub struct VapidKeys {
    public_key_b64: String,
    private_key_b64: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key_b64)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let public = signing_key.verifying_key().to_encoded_point(false);
        Self {
            public_key_b64: URL_SAFE_NO_PAD.encode(public.as_bytes()),
            private_key_b64: URL_SAFE_NO_PAD.encode(signing_key.to_bytes().as_slice()),
        }
    }

    /// Load a configured pair, checking that the two halves belong together.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str) -> Result<Self, VapidKeyError> {
        let public = decode_b64url(public_key_b64).ok_or(VapidKeyError::Encoding("public"))?;
        if public.len() != UNCOMPRESSED_POINT_LEN || public[0] != 0x04 {
            return Err(VapidKeyError::PublicKey);
        }

        let private = decode_b64url(private_key_b64).ok_or(VapidKeyError::Encoding("private"))?;
        if private.len() != PRIVATE_SCALAR_LEN {
            return Err(VapidKeyError::PrivateKey);
        }
        let signing_key = SigningKey::from_bytes(p256::FieldBytes::from_slice(&private))
            .map_err(|_| VapidKeyError::PrivateKey)?;

        let derived = signing_key.verifying_key().to_encoded_point(false);
        if derived.as_bytes() != public.as_slice() {
            return Err(VapidKeyError::Mismatch);
        }

        Ok(Self {
            public_key_b64: URL_SAFE_NO_PAD.encode(&public),
            private_key_b64: URL_SAFE_NO_PAD.encode(&private),
        })
    }

    /// Browser `applicationServerKey`.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    pub fn private_key_base64url(&self) -> &str {
        &self.private_key_b64
    }
}

/// Base64url decode, tolerating trailing padding.
fn decode_b64url(value: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).ok()
}

/// Whether a subscription's browser keys can be used for encryption.
pub fn keys_are_usable(keys: &WebKeys) -> bool {
    let p256dh_ok = decode_b64url(&keys.p256dh).is_some_and(|bytes| {
        bytes.len() == UNCOMPRESSED_POINT_LEN
            && bytes[0] == 0x04
            && p256::PublicKey::from_sec1_bytes(&bytes).is_ok()
    });
    let auth_ok = decode_b64url(&keys.auth).is_some_and(|bytes| bytes.len() == AUTH_SECRET_LEN);
    p256dh_ok && auth_ok
}

/// `Topic` header for an event key: SHA-256, base64url, cut to 32 characters.
pub fn topic_for(event_key: &str) -> String {
    let digest = Sha256::digest(event_key.as_bytes());
    let mut topic = URL_SAFE_NO_PAD.encode(digest);
    topic.truncate(MAX_TOPIC_LEN);
    topic
}

/// JSON shown by the service worker.
fn notification_body(payload: &NotificationPayload) -> Vec<u8> {
    let body = serde_json::json!({
        "title": payload.title,
        "body": payload.body,
        "tag": payload.event_key,
        "data": payload.client_data(),
    });
    body.to_string().into_bytes()
}

/// Web Push adapter. Every subscription has its own keys, so batches are of one.
pub struct WebPushChannel {
    client: reqwest::Client,
    keys: VapidKeys,
    subject: String,
    ttl_secs: u32,
}

impl WebPushChannel {
    pub fn new(client: reqwest::Client, keys: VapidKeys, subject: impl Into<String>) -> Self {
        Self {
            client,
            keys,
            subject: subject.into(),
            ttl_secs: crate::config::DEFAULT_WEB_PUSH_TTL_SECS,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u32) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Build from configuration, or `None` (with a warning) when the key pair
    /// or subject is missing or unusable.
    pub fn from_config(config: &WebPushConfig, client: reqwest::Client) -> Option<Self> {
        let (Some(public), Some(private), Some(subject)) = (
            config.public_key.as_deref(),
            config.private_key.as_deref(),
            config.subject.as_deref(),
        ) else {
            warn!("VAPID_PUBLIC_KEY, VAPID_PRIVATE_KEY and VAPID_SUBJECT not all set, web push disabled");
            return None;
        };

        if !["mailto:", "https:", "http:"]
            .iter()
            .any(|scheme| subject.starts_with(scheme))
        {
            warn!(subject, "VAPID_SUBJECT must be a mailto: or https: URI, web push disabled");
            return None;
        }

        match VapidKeys::from_base64url(public, private) {
            Ok(keys) => Some(Self::new(client, keys, subject).with_ttl(config.ttl_secs)),
            Err(e) => {
                warn!(error = %e, "invalid VAPID key pair, web push disabled");
                None
            }
        }
    }

    pub fn public_key(&self) -> &str {
        self.keys.public_key_base64url()
    }

    async fn send_one(
        &self,
        endpoint: &PushEndpoint,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryFailure> {
        let EndpointTarget::Web {
            endpoint: url,
            keys,
            ..
        } = &endpoint.target
        else {
            return Err(DeliveryFailure::Transient(
                "endpoint is not a web push subscription".into(),
            ));
        };

        let sub_info = SubscriptionInfo::new(url, &keys.p256dh, &keys.auth);

        let mut sig_builder =
            VapidSignatureBuilder::from_base64(self.keys.private_key_base64url(), &sub_info)
                .map_err(|e| DeliveryFailure::Transient(format!("VAPID signature: {e}")))?;
        sig_builder.add_claim("sub", self.subject.as_str());
        let signature = sig_builder
            .build()
            .map_err(|e| DeliveryFailure::Transient(format!("VAPID signing: {e}")))?;

        let body = notification_body(payload);
        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, &body);
        builder.set_vapid_signature(signature);
        builder.set_ttl(self.ttl_secs);
        let message = builder
            .build()
            .map_err(|e| DeliveryFailure::Transient(format!("message encryption: {e}")))?;

        let mut request = self
            .client
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string())
            .header("Topic", topic_for(&payload.event_key));

        if let Some(encrypted) = message.payload {
            request = request
                .header("Content-Encoding", encrypted.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");
            for (key, value) in &encrypted.crypto_headers {
                request = request.header(*key, value.as_str());
            }
            request = request.body(encrypted.content);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryFailure::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        let reason = format!("push service returned {}: {}", status.as_u16(), detail.trim());
        match status.as_u16() {
            404 | 410 => Err(DeliveryFailure::Permanent(reason)),
            _ => Err(DeliveryFailure::Transient(reason)),
        }
    }
}

#[async_trait]
impl PushChannel for WebPushChannel {
    fn channel(&self) -> Channel {
        Channel::Web
    }

    fn max_batch_size(&self) -> usize {
        1
    }

    fn is_valid_endpoint(&self, endpoint: &PushEndpoint) -> bool {
        match &endpoint.target {
            EndpointTarget::Web { keys, .. } => keys_are_usable(keys),
            EndpointTarget::Mobile { .. } => false,
        }
    }

    async fn send(
        &self,
        endpoints: &[PushEndpoint],
        payload: &NotificationPayload,
    ) -> Vec<SendReport> {
        let sends = endpoints.iter().map(|endpoint| async move {
            let result = self.send_one(endpoint, payload).await;
            debug!(endpoint = endpoint.identity(), ok = result.is_ok(), "web push sent");
            SendReport {
                identity: endpoint.identity().to_string(),
                result,
            }
        });
        join_all(sends).await
    }
}

#[cfg(test)]
mod tests {
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use rand::RngCore;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Keys a browser would hand out with its subscription.
    fn browser_keys() -> WebKeys {
        let secret = p256::SecretKey::random(&mut OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let mut auth = [0u8; AUTH_SECRET_LEN];
        rand::rng().fill_bytes(&mut auth);
        WebKeys {
            p256dh: URL_SAFE_NO_PAD.encode(point.as_bytes()),
            auth: URL_SAFE_NO_PAD.encode(auth),
        }
    }

    fn subscription(url: String, keys: WebKeys) -> PushEndpoint {
        PushEndpoint {
            id: "sub-1".into(),
            user_id: "user-1".into(),
            target: EndpointTarget::Web {
                endpoint: url,
                keys,
                user_agent: None,
            },
            active: true,
        }
    }

    fn channel() -> WebPushChannel {
        WebPushChannel::new(
            reqwest::Client::new(),
            VapidKeys::generate(),
            "mailto:ops@example.com",
        )
    }

    fn payload() -> NotificationPayload {
        NotificationPayload::new("request-created:42", "New request", "Towels for 204")
    }

    #[test]
    fn generated_keys_reload() {
        let keys = VapidKeys::generate();
        let reloaded =
            VapidKeys::from_base64url(keys.public_key_base64url(), keys.private_key_base64url())
                .unwrap();
        assert_eq!(reloaded.public_key_base64url(), keys.public_key_base64url());
        assert_eq!(URL_SAFE_NO_PAD.decode(keys.public_key_base64url()).unwrap().len(), 65);
    }

    #[test]
    fn mismatched_halves_are_rejected() {
        let a = VapidKeys::generate();
        let b = VapidKeys::generate();
        assert!(matches!(
            VapidKeys::from_base64url(a.public_key_base64url(), b.private_key_base64url()),
            Err(VapidKeyError::Mismatch)
        ));
        assert!(matches!(
            VapidKeys::from_base64url("AAAA", a.private_key_base64url()),
            Err(VapidKeyError::PublicKey)
        ));
        assert!(matches!(
            VapidKeys::from_base64url(a.public_key_base64url(), "!!!"),
            Err(VapidKeyError::Encoding("private"))
        ));
    }

    #[test]
    fn from_config_requires_every_field() {
        let keys = VapidKeys::generate();
        let mut config = WebPushConfig {
            public_key: Some(keys.public_key_base64url().into()),
            private_key: Some(keys.private_key_base64url().into()),
            subject: None,
            ..WebPushConfig::default()
        };
        assert!(WebPushChannel::from_config(&config, reqwest::Client::new()).is_none());

        config.subject = Some("ops@example.com".into());
        assert!(WebPushChannel::from_config(&config, reqwest::Client::new()).is_none());

        config.subject = Some("mailto:ops@example.com".into());
        assert!(WebPushChannel::from_config(&config, reqwest::Client::new()).is_some());
    }

    #[test]
    fn topic_fits_push_service_limit() {
        let topic = topic_for("request-status:8f0c1d2e:completed");
        assert_eq!(topic.len(), MAX_TOPIC_LEN);
        assert_eq!(topic, topic_for("request-status:8f0c1d2e:completed"));
        assert_ne!(topic, topic_for("request-status:8f0c1d2e:cancelled"));
        assert!(topic.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn validity_checks_browser_keys() {
        let ch = channel();
        let good = browser_keys();
        assert!(ch.is_valid_endpoint(&subscription("https://push.example.com/a".into(), good.clone())));

        let padded = WebKeys {
            p256dh: format!("{}=", good.p256dh),
            auth: format!("{}==", good.auth),
        };
        assert!(keys_are_usable(&padded));

        let short_auth = WebKeys {
            auth: URL_SAFE_NO_PAD.encode([1u8; 8]),
            ..good.clone()
        };
        assert!(!keys_are_usable(&short_auth));

        // 65 bytes with the right prefix, but not a point on the curve.
        let mut off_curve = [0xffu8; 65];
        off_curve[0] = 0x04;
        let bogus_point = WebKeys {
            p256dh: URL_SAFE_NO_PAD.encode(off_curve),
            ..good
        };
        assert!(!keys_are_usable(&bogus_point));
    }

    #[tokio::test]
    async fn created_is_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/abc"))
            .and(header("content-encoding", "aes128gcm"))
            .and(header("ttl", "86400"))
            .and(header("topic", topic_for("request-created:42").as_str()))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sub = subscription(format!("{}/push/abc", server.uri()), browser_keys());
        let reports = channel().send(&[sub.clone()], &payload()).await;
        assert_eq!(reports, vec![SendReport::delivered(sub.identity())]);
    }

    #[tokio::test]
    async fn gone_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let sub = subscription(format!("{}/push/gone", server.uri()), browser_keys());
        let reports = channel().send(&[sub], &payload()).await;
        assert!(matches!(reports[0].result, Err(DeliveryFailure::Permanent(_))));
    }

    #[tokio::test]
    async fn throttling_and_server_errors_are_transient() {
        for status in [429u16, 500, 400] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let sub = subscription(format!("{}/push/x", server.uri()), browser_keys());
            let reports = channel().send(&[sub], &payload()).await;
            assert!(
                matches!(reports[0].result, Err(DeliveryFailure::Transient(_))),
                "status {status}"
            );
        }
    }

    #[tokio::test]
    async fn unreachable_push_service_is_transient() {
        // Nothing listens on port 9 of localhost.
        let sub = subscription("http://127.0.0.1:9/push/x".into(), browser_keys());
        let reports = channel().send(&[sub], &payload()).await;
        assert!(matches!(reports[0].result, Err(DeliveryFailure::Transient(_))));
    }
}
