//! Stripe REST API wire types used by the billing client.
//!
//! Only fields the reconciliation engine consumes are captured; the
//! rest of Stripe's schema is ignored by serde.

use serde::Deserialize;

/// Subscription object as returned by `GET /v1/subscriptions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiSubscription {
    /// Subscription identifier (sub_...).
    pub id: String,

    /// Owning customer identifier.
    pub customer: String,

    /// Provider status string.
    pub status: String,

    /// Current period start (Unix timestamp).
    pub current_period_start: i64,

    /// Current period end (Unix timestamp).
    pub current_period_end: i64,

    /// Whether the subscription cancels at period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,

    /// Subscription items (price/quantity pairs).
    #[serde(default)]
    pub items: StripeApiItems,
}

impl StripeApiSubscription {
    /// The price id of the first subscription item, if present.
    pub fn plan_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

/// Subscription items container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeApiItems {
    #[serde(default)]
    pub data: Vec<StripeApiItem>,
}

/// Single subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiItem {
    pub id: String,
    pub price: StripeApiPrice,
}

/// Price object embedded in subscription items.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiPrice {
    pub id: String,
}

/// Error envelope returned by the Stripe API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiErrorEnvelope {
    pub error: StripeApiError,
}

/// Error body inside the envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    /// Error category (e.g., "invalid_request_error").
    #[serde(rename = "type")]
    pub error_type: Option<String>,

    /// Machine-readable code (e.g., "resource_missing").
    pub code: Option<String>,

    /// Human-readable message.
    pub message: Option<String>,
}
