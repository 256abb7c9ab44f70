//! Subscription status as reported by the billing provider.
//!
//! The reconciliation engine mirrors provider state rather than owning
//! its own lifecycle, so the status set tracks Stripe's vocabulary. The
//! wire strings are preserved exactly for round-tripping to the store.

use serde::{Deserialize, Serialize};

/// Current status of a subscription in the provider's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current.
    Active,

    /// Payment failed, provider retry schedule running.
    PastDue,

    /// Cancelled. May still be inside its paid period.
    Canceled,

    /// In a trial period.
    Trialing,

    /// Initial payment not yet completed.
    Incomplete,

    /// Initial payment window lapsed.
    IncompleteExpired,

    /// Retries exhausted, unpaid.
    Unpaid,

    /// Collection paused by the merchant.
    Paused,

    /// Status string we don't recognise; preserved as-is in the store.
    Unknown,
}

impl SubscriptionStatus {
    /// Parse a provider status string.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "trialing" => Self::Trialing,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }

    /// The provider's wire string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Trialing => "trialing",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if the provider would still bill this subscription.
    ///
    /// Used when deciding whether an upstream cancellation is worth
    /// attempting for a locally superseded row.
    pub fn is_billable(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}
