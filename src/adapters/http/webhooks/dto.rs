//! Response DTOs for the webhook ingress.

use serde::Serialize;

/// Acknowledgement body returned with 200 on accepted deliveries.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WebhookAck {
    /// Normal success: `{"received": true}`.
    Received { received: bool },

    /// Short-circuit outcomes: `{"status": "...", "reason": "..."}`.
    Status {
        status: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl WebhookAck {
    /// The event was processed (or acknowledged as not-for-us).
    pub fn received() -> Self {
        Self::Received { received: true }
    }

    /// The event had been processed before.
    pub fn already_processed() -> Self {
        Self::Status {
            status: "already_processed",
            reason: None,
        }
    }

    /// The purchase was refused as a duplicate.
    pub fn blocked(reason: String) -> Self {
        Self::Status {
            status: "blocked",
            reason: Some(reason),
        }
    }
}

/// Error body returned on rejected deliveries.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
