//! Billing provider port for the external payment system.
//!
//! The reconciliation engine needs two operations from the provider:
//! retrieve a subscription (to check whether an upstream cancellation is
//! still needed) and cancel one (when a duplicate purchase is blocked or
//! an old subscription is replaced). Both may fail with provider errors
//! that callers must tolerate; local state is the source of truth once
//! committed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::SubscriptionStatus;

/// Subscription state as the provider currently reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// Provider subscription id (sub_...).
    pub id: String,

    /// Provider customer id (cus_...).
    pub customer_id: String,

    /// Provider lifecycle status.
    pub status: SubscriptionStatus,

    /// Current period start (Unix timestamp).
    pub current_period_start: i64,

    /// Current period end (Unix timestamp).
    pub current_period_end: i64,

    /// Whether the subscription cancels at period end.
    pub cancel_at_period_end: bool,

    /// Price/plan identifier.
    pub plan_id: Option<String>,
}

/// Port for billing provider integrations.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Retrieve a subscription by provider id.
    ///
    /// Returns `None` if the provider no longer knows the id.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ProviderSubscription>, BillingProviderError>;

    /// Cancel a subscription.
    ///
    /// If `at_period_end` is true, the subscription remains active until
    /// its period ends. Cancelling an already-cancelled subscription is
    /// reported via `is_already_canceled()` and should be treated as
    /// success by callers.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, BillingProviderError>;
}

/// Errors from billing provider operations.
#[derive(Debug, Clone)]
pub struct BillingProviderError {
    /// Error category.
    pub code: BillingProviderErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's own error code, if it sent one.
    pub provider_code: Option<String>,
}

impl BillingProviderError {
    /// Create a new provider error.
    pub fn new(code: BillingProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
        }
    }

    /// Attach the provider's own error code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BillingProviderErrorCode::Network, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(
            BillingProviderErrorCode::NotFound,
            format!("{} not found", resource),
        )
    }

    /// True if the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            BillingProviderErrorCode::Network | BillingProviderErrorCode::RateLimited
        )
    }

    /// True if the provider reports the subscription already cancelled.
    ///
    /// Callers treat this as success: the end state matches what was
    /// requested.
    pub fn is_already_canceled(&self) -> bool {
        self.code == BillingProviderErrorCode::AlreadyCanceled
    }
}

impl std::fmt::Display for BillingProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BillingProviderError {}

/// Billing provider error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingProviderErrorCode {
    /// Network connectivity issue.
    Network,
    /// API authentication failed.
    Authentication,
    /// Resource not found.
    NotFound,
    /// Subscription is already cancelled on the provider.
    AlreadyCanceled,
    /// Rate limit exceeded.
    RateLimited,
    /// Other provider-side error.
    Provider,
}

impl std::fmt::Display for BillingProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingProviderErrorCode::Network => "network_error",
            BillingProviderErrorCode::Authentication => "authentication_error",
            BillingProviderErrorCode::NotFound => "not_found",
            BillingProviderErrorCode::AlreadyCanceled => "already_canceled",
            BillingProviderErrorCode::RateLimited => "rate_limited",
            BillingProviderErrorCode::Provider => "provider_error",
        };
        write!(f, "{}", s)
    }
}
