//! # Notification Sink
//!
//! The seam to the external notification transport.
//!
//! ## Fire-and-Forget Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Settlement operation                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT (order / payout write)     ← the primary operation             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sink.deliver(notification)        ← only AFTER the commit             │
//! │       │                                                                 │
//! │       ├── Ok  → nothing more to do                                     │
//! │       └── Err → tracing::warn! and carry on                            │
//! │                                                                         │
//! │  A lost notification is an annoyance; a rolled-back order because      │
//! │  the mail server hiccuped would be a bug. Failures are observed        │
//! │  (logged with recipient and category) but never propagated.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Recipient token for the admin role (the transport fans it out).
pub const ADMIN_RECIPIENT: &str = "role:admin";

/// Notification categories used by the settlement services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Order,
    Payout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Normal,
    High,
}

/// A notification handed to the external transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// User id, vendor id, or a role token like [`ADMIN_RECIPIENT`].
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub priority: NotificationPriority,
    /// Structured context (order id, payout id, amounts).
    pub metadata: Value,
    /// Optional deep link into the back office UI.
    pub link: Option<String>,
}

/// Errors the transport may report.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification transport unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// The transport seam. Implementations live outside this crate.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// A sink that drops everything. Useful for tests and batch tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Delivers a notification, observing (but never propagating) failure.
pub(crate) async fn dispatch(sink: &dyn NotificationSink, notification: Notification) {
    let recipient = notification.recipient_id.clone();
    let category = notification.category;

    if let Err(err) = sink.deliver(notification).await {
        warn!(
            recipient = %recipient,
            ?category,
            error = %err,
            "Notification delivery failed"
        );
    }
}

// =============================================================================
// Test Support
// =============================================================================
