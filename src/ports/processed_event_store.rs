//! ProcessedEventStore port - append-only log of handled webhook events.
//!
//! This port enables idempotent webhook handling by tracking which
//! provider events have been processed, together with the payload and
//! outcome for debugging and auditing.
//!
//! ## Why Webhook Idempotency Matters
//!
//! Stripe may deliver the same webhook multiple times due to:
//! - Network timeouts
//! - 5xx response from our endpoint (triggers retry)
//! - Our endpoint returning success but Stripe not receiving it
//!
//! A record is written only after the mutation it describes has been
//! committed (or immediately for short-circuit outcomes such as a
//! blocked duplicate, where no further mutation follows). Failed
//! processing writes no record, so redelivery can retry safely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// Record of a processed webhook event.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    /// Provider event id (evt_xxx format). Globally unique.
    pub event_id: String,

    /// Event kind string (e.g., "checkout.session.completed").
    pub event_kind: String,

    /// Provider subscription id the event affected, if any.
    pub stripe_subscription_id: Option<String>,

    /// Outcome of processing: "success", "ignored", or "blocked".
    pub outcome: String,

    /// Outcome detail (ignore reason, block reason).
    pub detail: Option<String>,

    /// Original event payload for debugging.
    pub payload: serde_json::Value,

    /// When the event was processed.
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    /// Creates a success record.
    pub fn success(
        event_id: impl Into<String>,
        event_kind: impl Into<String>,
        stripe_subscription_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_kind: event_kind.into(),
            stripe_subscription_id,
            outcome: "success".to_string(),
            detail: None,
            payload,
            processed_at: Utc::now(),
        }
    }

    /// Creates an ignored record (acknowledged, nothing to do).
    pub fn ignored(
        event_id: impl Into<String>,
        event_kind: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_kind: event_kind.into(),
            stripe_subscription_id: None,
            outcome: "ignored".to_string(),
            detail: Some(reason.into()),
            payload,
            processed_at: Utc::now(),
        }
    }

    /// Creates a blocked record (duplicate purchase refused).
    pub fn blocked(
        event_id: impl Into<String>,
        event_kind: impl Into<String>,
        stripe_subscription_id: Option<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_kind: event_kind.into(),
            stripe_subscription_id,
            outcome: "blocked".to_string(),
            detail: Some(reason.into()),
            payload,
            processed_at: Utc::now(),
        }
    }
}

/// Result of attempting to insert a processed-event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Record was inserted (first time seeing this event).
    Inserted,
    /// Record already exists (concurrent duplicate delivery).
    AlreadyExists,
}

/// Port for the append-only processed-event log.
///
/// Implementations must use a uniqueness constraint (PRIMARY KEY on
/// event_id) so concurrent deliveries of the same event race safely:
/// first insert wins, the rest observe `AlreadyExists`.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Find a previously processed event by its provider event id.
    ///
    /// Returns `None` if the event hasn't been processed yet.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, DomainError>;

    /// Attempt to insert a record with `ON CONFLICT DO NOTHING` semantics.
    async fn record(&self, event: ProcessedEvent) -> Result<InsertOutcome, DomainError>;

    /// Delete records processed before the given timestamp.
    ///
    /// Returns the number of records deleted. Used for retention
    /// (e.g., keep 30 days).
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError>;
}
