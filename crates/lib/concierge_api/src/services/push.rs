// @zen-component: PUSH-SubscriptionEndpoints
//
//! Push subscription service: registration and test sends on behalf of the
//! authenticated user.

use concierge_core::push::dispatcher::{DispatchResult, Dispatcher};
use concierge_core::push::events;
use concierge_core::push::registry::PushRegistry;

use crate::error::AppResult;
use crate::models::{
    MobileSubscriptionRequest, SubscriptionResponse, UnsubscribeRequest, UnsubscribeResponse,
    WebSubscriptionRequest,
};

pub async fn register_web(
    registry: &PushRegistry,
    user_id: &str,
    body: &WebSubscriptionRequest,
) -> AppResult<SubscriptionResponse> {
    registry
        .register_web(
            user_id,
            &body.endpoint,
            &body.keys.p256dh,
            &body.keys.auth,
            body.user_agent.as_deref(),
        )
        .await?;
    Ok(SubscriptionResponse { registered: true })
}

/// Malformed tokens are accepted with `registered: false`.
pub async fn register_mobile(
    registry: &PushRegistry,
    user_id: &str,
    body: &MobileSubscriptionRequest,
) -> AppResult<SubscriptionResponse> {
    let registered = registry.register_mobile(user_id, &body.token).await?;
    Ok(SubscriptionResponse { registered })
}

/// Only endpoints registered to `user_id` are removed.
pub async fn unsubscribe(
    registry: &PushRegistry,
    user_id: &str,
    body: &UnsubscribeRequest,
) -> AppResult<UnsubscribeResponse> {
    let removed = registry
        .unsubscribe(user_id, body.channel, &body.identity)
        .await?;
    Ok(UnsubscribeResponse { removed })
}

/// Send a test notification to every device of `user_id` and wait for the result.
pub async fn send_test(dispatcher: &Dispatcher, user_id: &str) -> DispatchResult {
    dispatcher
        .notify(user_id, &events::test_notification())
        .await
}
