//! Stripe webhook event types.
//!
//! Defines the structures for parsing Stripe webhook payloads.
//! Only fields relevant to reconciliation are captured.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Stripe webhook event (simplified).
///
/// Contains the essential fields needed for reconciliation. Additional
/// fields from Stripe's full event schema are ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    /// Object containing event-specific data.
    pub data: StripeEventData,

    /// Whether this is a live mode event (vs test mode).
    pub livemode: bool,

    /// API version used to render this event.
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event (polymorphic based on event type).
    pub object: serde_json::Value,

    /// Previous values for updated attributes (only for update events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    /// Returns true if this is a live mode event.
    pub fn is_live(&self) -> bool {
        self.livemode
    }

    /// Parse the event type into a known enum variant.
    pub fn kind(&self) -> StripeEventKind {
        StripeEventKind::parse(&self.event_type)
    }

    /// Attempts to deserialize the data object as the specified type.
    pub fn deserialize_object<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// Event kinds the reconciliation engine dispatches on.
///
/// An enum key makes the handler table exhaustive at compile time;
/// anything outside this set falls into `Unknown` and is acknowledged
/// without processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripeEventKind {
    /// Purchase completed via hosted checkout; carries the user identity.
    CheckoutSessionCompleted,
    /// Provider-side subscription object created.
    SubscriptionCreated,
    /// Subscription fields changed (status, periods, cancellation flag).
    SubscriptionUpdated,
    /// Subscription deleted/ended on the provider.
    SubscriptionDeleted,
    /// A scheduled plan change was applied.
    SubscriptionPendingUpdateApplied,
    /// A scheduled plan change lapsed without payment.
    SubscriptionPendingUpdateExpired,
    /// Trial ending soon; period fields may shift.
    SubscriptionTrialWillEnd,
    /// Unknown or unhandled event type.
    Unknown,
}

impl StripeEventKind {
    /// Parse event kind from the wire string.
    pub fn parse(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "customer.subscription.pending_update_applied" => {
                Self::SubscriptionPendingUpdateApplied
            }
            "customer.subscription.pending_update_expired" => {
                Self::SubscriptionPendingUpdateExpired
            }
            "customer.subscription.trial_will_end" => Self::SubscriptionTrialWillEnd,
            _ => Self::Unknown,
        }
    }

    /// Convert to the Stripe event type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::SubscriptionPendingUpdateApplied => {
                "customer.subscription.pending_update_applied"
            }
            Self::SubscriptionPendingUpdateExpired => {
                "customer.subscription.pending_update_expired"
            }
            Self::SubscriptionTrialWillEnd => "customer.subscription.trial_will_end",
            Self::Unknown => "unknown",
        }
    }
}

/// Checkout session object as carried by `checkout.session.completed`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSessionPayload {
    /// Session identifier (cs_...).
    pub id: String,

    /// Customer the session was completed for.
    pub customer: Option<String>,

    /// Subscription created by the session, if subscription mode.
    pub subscription: Option<String>,

    /// Custom metadata attached at session creation; carries `user_id`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionPayload {
    /// The internal user id attached to the session at creation time.
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("user_id").map(String::as_str)
    }
}

/// Subscription object as carried by `customer.subscription.*` events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionPayload {
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
    pub items: SubscriptionItemsPayload,
}

impl SubscriptionPayload {
    /// The price id of the first subscription item, if present.
    pub fn plan_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

/// Subscription items container.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionItemsPayload {
    #[serde(default)]
    pub data: Vec<SubscriptionItemPayload>,
}

/// Single subscription item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionItemPayload {
    pub id: String,
    pub price: PricePayload,
}

/// Price object embedded in subscription items.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricePayload {
    pub id: String,
}

/// Builder for creating test StripeEvent instances.
#[cfg(test)]
pub struct StripeEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new() -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: "checkout.session.completed".to_string(),
            created: chrono::Utc::now().timestamp(),
            object: serde_json::json!({}),
            livemode: false,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn livemode(mut self, livemode: bool) -> Self {
        self.livemode = livemode;
        self
    }

    pub fn build(self) -> StripeEvent {
        StripeEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: StripeEventData {
                object: self.object,
                previous_attributes: None,
            },
            livemode: self.livemode,
            api_version: Some("2023-10-16".to_string()),
        }
    }
}
