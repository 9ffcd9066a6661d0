//! Push subscription request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use concierge_core::push::dispatcher::DispatchResult;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    MobileSubscriptionRequest, SubscriptionResponse, UnsubscribeRequest, UnsubscribeResponse,
    VapidPublicKeyResponse, WebSubscriptionRequest,
};
use crate::services::push;

/// `GET /push/vapid-public-key`: application server key for `pushManager.subscribe`.
pub async fn vapid_public_key_handler(
    State(state): State<AppState>,
) -> AppResult<Json<VapidPublicKeyResponse>> {
    let public_key = state
        .vapid_public_key
        .clone()
        .ok_or_else(|| AppError::NotFound("Web push is not configured".into()))?;
    Ok(Json(VapidPublicKeyResponse { public_key }))
}

/// `POST /push/subscriptions/web`: register a browser subscription.
pub async fn register_web_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<WebSubscriptionRequest>,
) -> AppResult<Json<SubscriptionResponse>> {
    let resp = push::register_web(&state.registry, &user.0.user_id, &body).await?;
    Ok(Json(resp))
}

/// `POST /push/subscriptions/mobile`: register an Expo push token.
pub async fn register_mobile_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<MobileSubscriptionRequest>,
) -> AppResult<Json<SubscriptionResponse>> {
    let resp = push::register_mobile(&state.registry, &user.0.user_id, &body).await?;
    Ok(Json(resp))
}

/// `POST /push/unsubscribe`: forget one of the caller's web subscriptions or
/// mobile tokens.
pub async fn unsubscribe_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<UnsubscribeRequest>,
) -> AppResult<Json<UnsubscribeResponse>> {
    let resp = push::unsubscribe(&state.registry, &user.0.user_id, &body).await?;
    Ok(Json(resp))
}

/// `POST /push/test`: notify the caller's own devices and return the outcome.
pub async fn test_notification_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<DispatchResult> {
    Json(push::send_test(&state.dispatcher, &user.0.user_id).await)
}
