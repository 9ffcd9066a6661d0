//! Shared helpers for router integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use concierge_api::AppState;
use concierge_core::auth::password::hash_password;
use concierge_core::config::{DispatchConfig, SessionConfig};
use concierge_core::models::auth::Role;
use concierge_core::push::ChannelSet;
use concierge_core::store::memory::MemoryStore;
use serde_json::Value;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse battery";

pub fn state(store: Arc<MemoryStore>, config: SessionConfig) -> AppState {
    AppState::new(
        store,
        &config,
        ChannelSet::default(),
        &DispatchConfig::default(),
    )
    .expect("app state")
}

/// Memory store with one staff user; returns the store and the user id.
pub fn seeded_store() -> (Arc<MemoryStore>, String) {
    let store = Arc::new(MemoryStore::new());
    let id = store.insert_user(
        "staff@hotel.example",
        Some(hash_password(PASSWORD).expect("hash")),
        Role::Staff,
        Some("hotel-1"),
    );
    (store, id)
}

pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("request");

    let resp = app.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}

/// Log the seeded user in and return `(access_token, refresh_token)`.
pub async fn login(app: &Router) -> (String, String) {
    let (status, json) = call(
        app,
        "POST",
        "/auth/login",
        Some(serde_json::json!({"email": "staff@hotel.example", "password": PASSWORD})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {json}");
    (
        json["accessToken"].as_str().expect("accessToken").to_string(),
        json["refreshToken"].as_str().expect("refreshToken").to_string(),
    )
}
