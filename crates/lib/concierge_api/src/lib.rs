//! # concierge_api
//!
//! HTTP API for Concierge sessions and push notifications.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use concierge_core::auth::AuthError;
use concierge_core::auth::session::SessionService;
use concierge_core::config::{DispatchConfig, SessionConfig};
use concierge_core::push::ChannelSet;
use concierge_core::push::dispatcher::Dispatcher;
use concierge_core::push::registry::PushRegistry;
use concierge_core::store::CredentialStore;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{auth, push};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub registry: PushRegistry,
    pub dispatcher: Arc<Dispatcher>,
    /// VAPID application server key, `None` when web push is disabled.
    pub vapid_public_key: Option<String>,
}

impl AppState {
    /// Wire the services around one credential store.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        session: &SessionConfig,
        channels: ChannelSet,
        dispatch: &DispatchConfig,
    ) -> Result<Self, AuthError> {
        let sessions = SessionService::new(store.clone(), session)?;
        let vapid_public_key = channels.vapid_public_key();
        let dispatcher = Dispatcher::new(store.clone(), channels.into_channels(), dispatch);
        Ok(Self {
            sessions: Arc::new(sessions),
            registry: PushRegistry::new(store),
            dispatcher: Arc::new(dispatcher),
            vapid_public_key,
        })
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(
            routes::GET_PUSH_VAPID_PUBLIC_KEY,
            get(push::vapid_public_key_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::POST_AUTH_LOGOUT_ALL, post(auth::logout_all_handler))
        .route(
            routes::POST_PUSH_SUBSCRIPTIONS_WEB,
            post(push::register_web_handler),
        )
        .route(
            routes::POST_PUSH_SUBSCRIPTIONS_MOBILE,
            post(push::register_mobile_handler),
        )
        .route(routes::POST_PUSH_UNSUBSCRIBE, post(push::unsubscribe_handler))
        .route(routes::POST_PUSH_TEST, post(push::test_notification_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
