// @zen-component: PUSH-NotificationDispatcher
//
//! Fanout of one notification to every live endpoint of a user.
//!
//! Delivery is best-effort: failures are reported per endpoint in the
//! [`DispatchResult`] and never surface as errors. Endpoints that a gateway
//! reports as permanently gone are deactivated on the way out.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{DeliveryFailure, PushChannel};
use crate::config::DispatchConfig;
use crate::models::push::{Channel, NotificationPayload, PushEndpoint};
use crate::store::CredentialStore;

/// What happened to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EndpointOutcome {
    Delivered,
    /// The adapter's validity check rejected the endpoint; nothing was sent.
    SkippedInvalid,
    /// No adapter is configured for the endpoint's channel.
    ChannelUnavailable,
    PermanentFailure { reason: String, deactivated: bool },
    TransientFailure { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    pub channel: Channel,
    pub identity: String,
    #[serde(flatten)]
    pub outcome: EndpointOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchCounts {
    pub delivered: usize,
    pub skipped_invalid: usize,
    pub channel_unavailable: usize,
    pub permanently_failed: usize,
    pub deactivated: usize,
    pub transiently_failed: usize,
}

impl DispatchCounts {
    fn tally(reports: &[EndpointReport]) -> Self {
        let mut counts = Self::default();
        for report in reports {
            match &report.outcome {
                EndpointOutcome::Delivered => counts.delivered += 1,
                EndpointOutcome::SkippedInvalid => counts.skipped_invalid += 1,
                EndpointOutcome::ChannelUnavailable => counts.channel_unavailable += 1,
                EndpointOutcome::PermanentFailure { deactivated, .. } => {
                    counts.permanently_failed += 1;
                    if *deactivated {
                        counts.deactivated += 1;
                    }
                }
                EndpointOutcome::TransientFailure { .. } => counts.transiently_failed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// The user has no active endpoint.
    NoRecipients,
    Attempted,
    /// Endpoints could not be read; nothing was sent.
    LookupFailed { reason: String },
}

/// Aggregate result of one [`Dispatcher::notify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub user_id: String,
    pub event_key: String,
    #[serde(flatten)]
    pub status: DispatchStatus,
    pub counts: DispatchCounts,
    pub endpoints: Vec<EndpointReport>,
}

impl DispatchResult {
    fn without_attempt(user_id: &str, payload: &NotificationPayload, status: DispatchStatus) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_key: payload.event_key.clone(),
            status,
            counts: DispatchCounts::default(),
            endpoints: Vec::new(),
        }
    }
}

/// Fans notifications out over the configured channel adapters.
pub struct Dispatcher {
    store: Arc<dyn CredentialStore>,
    channels: BTreeMap<Channel, Arc<dyn PushChannel>>,
    permits: Arc<Semaphore>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        channels: Vec<Arc<dyn PushChannel>>,
        config: &DispatchConfig,
    ) -> Self {
        let channels = channels
            .into_iter()
            .map(|adapter| (adapter.channel(), adapter))
            .collect();
        Self {
            store,
            channels,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            send_timeout: config.send_timeout,
        }
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Deliver `payload` to every active endpoint of `user_id`.
    pub async fn notify(&self, user_id: &str, payload: &NotificationPayload) -> DispatchResult {
        let endpoints = match self.store.list_active_push_endpoints(user_id).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(user_id, event_key = %payload.event_key, error = %e, "push endpoint lookup failed");
                return DispatchResult::without_attempt(
                    user_id,
                    payload,
                    DispatchStatus::LookupFailed {
                        reason: e.to_string(),
                    },
                );
            }
        };
        if endpoints.is_empty() {
            debug!(user_id, event_key = %payload.event_key, "no push endpoints");
            return DispatchResult::without_attempt(user_id, payload, DispatchStatus::NoRecipients);
        }

        let mut by_channel: BTreeMap<Channel, Vec<PushEndpoint>> = BTreeMap::new();
        let mut seen = HashSet::new();
        for endpoint in endpoints {
            if seen.insert((endpoint.channel(), endpoint.identity().to_string())) {
                by_channel.entry(endpoint.channel()).or_default().push(endpoint);
            }
        }

        let mut reports = Vec::new();
        let mut chunks = Vec::new();
        for (channel, endpoints) in by_channel {
            let Some(adapter) = self.channels.get(&channel) else {
                debug!(user_id, %channel, endpoints = endpoints.len(), "channel unavailable");
                reports.extend(
                    endpoints
                        .iter()
                        .map(|e| report(e, EndpointOutcome::ChannelUnavailable)),
                );
                continue;
            };

            let (valid, invalid): (Vec<_>, Vec<_>) = endpoints
                .into_iter()
                .partition(|e| adapter.is_valid_endpoint(e));
            for endpoint in &invalid {
                debug!(user_id, %channel, endpoint_id = %endpoint.id, "skipping invalid endpoint");
                reports.push(report(endpoint, EndpointOutcome::SkippedInvalid));
            }

            for chunk in valid.chunks(adapter.max_batch_size().max(1)) {
                chunks.push(self.send_chunk(Arc::clone(adapter), chunk.to_vec(), payload));
            }
        }

        for chunk_reports in join_all(chunks).await {
            reports.extend(chunk_reports);
        }

        let counts = DispatchCounts::tally(&reports);
        info!(
            user_id,
            event_key = %payload.event_key,
            delivered = counts.delivered,
            skipped_invalid = counts.skipped_invalid,
            channel_unavailable = counts.channel_unavailable,
            permanently_failed = counts.permanently_failed,
            deactivated = counts.deactivated,
            transiently_failed = counts.transiently_failed,
            "notification dispatched"
        );

        DispatchResult {
            user_id: user_id.to_string(),
            event_key: payload.event_key.clone(),
            status: DispatchStatus::Attempted,
            counts,
            endpoints: reports,
        }
    }

    /// Run [`notify`](Self::notify) on a detached task.
    pub fn spawn_notify(
        self: &Arc<Self>,
        user_id: impl Into<String>,
        payload: NotificationPayload,
    ) -> JoinHandle<DispatchResult> {
        let dispatcher = Arc::clone(self);
        let user_id = user_id.into();
        tokio::spawn(async move { dispatcher.notify(&user_id, &payload).await })
    }

    async fn send_chunk(
        &self,
        adapter: Arc<dyn PushChannel>,
        chunk: Vec<PushEndpoint>,
        payload: &NotificationPayload,
    ) -> Vec<EndpointReport> {
        let channel = adapter.channel();

        // The permit covers the gateway call only, not the store writes below.
        let sent = match self.permits.acquire().await {
            Ok(_permit) => tokio::time::timeout(self.send_timeout, adapter.send(&chunk, payload))
                .await
                .map_err(|_| format!("send timed out after {:?}", self.send_timeout)),
            Err(_) => Err("dispatcher is shutting down".to_string()),
        };

        let mut results: HashMap<String, Result<(), DeliveryFailure>> = match sent {
            Ok(reports) => reports
                .into_iter()
                .map(|r| (r.identity, r.result))
                .collect(),
            Err(reason) => {
                warn!(%channel, endpoints = chunk.len(), %reason, "push chunk not sent");
                chunk
                    .iter()
                    .map(|e| {
                        (
                            e.identity().to_string(),
                            Err(DeliveryFailure::Transient(reason.clone())),
                        )
                    })
                    .collect()
            }
        };

        let mut reports = Vec::with_capacity(chunk.len());
        for endpoint in &chunk {
            let result = results.remove(endpoint.identity()).unwrap_or_else(|| {
                Err(DeliveryFailure::Transient("channel returned no report".into()))
            });
            reports.push(self.settle(endpoint, result).await);
        }
        reports
    }

    async fn settle(
        &self,
        endpoint: &PushEndpoint,
        result: Result<(), DeliveryFailure>,
    ) -> EndpointReport {
        let channel = endpoint.channel();
        let outcome = match result {
            Ok(()) => {
                debug!(%channel, endpoint_id = %endpoint.id, "push delivered");
                EndpointOutcome::Delivered
            }
            Err(DeliveryFailure::Transient(reason)) => {
                warn!(%channel, endpoint_id = %endpoint.id, %reason, "transient push failure");
                EndpointOutcome::TransientFailure { reason }
            }
            Err(DeliveryFailure::Permanent(reason)) => {
                let deactivated = match self
                    .store
                    .set_push_endpoint_active(channel, endpoint.identity(), false)
                    .await
                {
                    Ok(changed) => changed,
                    Err(e) => {
                        error!(%channel, endpoint_id = %endpoint.id, error = %e, "failed to deactivate push endpoint");
                        false
                    }
                };
                info!(%channel, endpoint_id = %endpoint.id, %reason, deactivated, "push endpoint gone");
                EndpointOutcome::PermanentFailure {
                    reason,
                    deactivated,
                }
            }
        };
        report(endpoint, outcome)
    }
}

fn report(endpoint: &PushEndpoint, outcome: EndpointOutcome) -> EndpointReport {
    EndpointReport {
        channel: endpoint.channel(),
        identity: endpoint.identity().to_string(),
        outcome,
    }
}
