//! Notification payloads for the business events that trigger a push.
//!
//! Event keys are stable per logical event so that clients (and push services,
//! via the Web Push `Topic`) can collapse duplicates:
//!
//! - `request-created:{request_id}`
//! - `request-status:{request_id}:{status}`
//! - `test:{uuid}`

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::push::NotificationPayload;
use crate::uuid::uuidv4;

/// Lifecycle of a guest service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Acknowledged,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Acknowledged => "acknowledged",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Wording shown to guests.
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Acknowledged => "acknowledged by staff",
            RequestStatus::InProgress => "in progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff-facing notice that a guest raised a request.
pub fn request_created(request_id: &str, room: &str, service: &str) -> NotificationPayload {
    NotificationPayload::new(
        format!("request-created:{request_id}"),
        "New service request",
        format!("{service} requested for room {room}"),
    )
    .with_data(json!({
        "type": "request_created",
        "requestId": request_id,
        "room": room,
    }))
    .with_url(format!("/staff/requests/{request_id}"))
}

/// Guest-facing notice that their request moved to `status`.
pub fn request_status_changed(
    request_id: &str,
    service: &str,
    status: RequestStatus,
) -> NotificationPayload {
    NotificationPayload::new(
        format!("request-status:{request_id}:{status}"),
        "Request update",
        format!("Your {service} request is {}", status.label()),
    )
    .with_data(json!({
        "type": "request_status_changed",
        "requestId": request_id,
        "status": status,
    }))
    .with_url(format!("/requests/{request_id}"))
}

/// A one-off notification to check a user's devices. Every call gets a new key.
pub fn test_notification() -> NotificationPayload {
    NotificationPayload::new(
        format!("test:{}", uuidv4()),
        "Test notification",
        "Push notifications are working on this device.",
    )
    .with_data(json!({ "type": "test" }))
}
