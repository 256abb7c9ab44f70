//! Active-subscription guard.
//!
//! Classifies a customer's existing subscription rows before a new one
//! is created. Any truly-active row blocks the creation; replaceable
//! rows are handed to the replacement step; superseded rows are inert
//! and ignored.
//!
//! The classification is advisory: two concurrent creations can both
//! pass it. The database partial unique index is the enforcement, and
//! callers map its violation to the same blocked outcome.

use std::sync::Arc;

use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionStore;

use super::Subscription;

/// How an existing row relates to a new creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Blocks new creation: active, not flagged, period end in future.
    TrulyActive,
    /// Eligible to be superseded: flagged for cancellation or past its
    /// period end.
    Replaceable,
    /// Already superseded or otherwise irrelevant.
    Inert,
}

/// Classify a single row relative to `now`.
pub fn classify(subscription: &Subscription, now: Timestamp) -> Disposition {
    if subscription.is_truly_active(now) {
        Disposition::TrulyActive
    } else if subscription.is_replaceable(now) {
        Disposition::Replaceable
    } else {
        Disposition::Inert
    }
}

/// Result of assessing a customer's existing rows.
#[derive(Debug, Default)]
pub struct GuardAssessment {
    /// Rows that block the new creation.
    pub blocking: Vec<Subscription>,
    /// Rows to supersede before the new row is written.
    pub replaceable: Vec<Subscription>,
}

impl GuardAssessment {
    /// True if the new creation must be refused.
    pub fn is_blocked(&self) -> bool {
        !self.blocking.is_empty()
    }
}

/// Guard over the subscription store.
pub struct ActiveSubscriptionGuard {
    store: Arc<dyn SubscriptionStore>,
}

impl ActiveSubscriptionGuard {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Assess all rows reachable through either identity channel.
    ///
    /// Rows for the external subscription id being created are excluded:
    /// a redelivered or cross-stream event for the same purchase must
    /// confirm, not block, itself.
    pub async fn assess(
        &self,
        customer_id: &CustomerId,
        user_id: Option<&UserId>,
        exclude_external_id: &str,
        now: Timestamp,
    ) -> Result<GuardAssessment, DomainError> {
        let mut candidates = self.store.list_by_customer(customer_id).await?;

        if let Some(user_id) = user_id {
            for row in self.store.list_by_user(user_id).await? {
                if !candidates.iter().any(|c| c.id == row.id) {
                    candidates.push(row);
                }
            }
        }

        let mut assessment = GuardAssessment::default();
        for row in candidates {
            if row.stripe_subscription_id == exclude_external_id {
                continue;
            }
            match classify(&row, now) {
                Disposition::TrulyActive => assessment.blocking.push(row),
                Disposition::Replaceable => assessment.replaceable.push(row),
                Disposition::Inert => {}
            }
        }

        Ok(assessment)
    }

    /// Internal ids of rows the assessment would supersede.
    pub fn replaceable_ids(assessment: &GuardAssessment) -> Vec<SubscriptionId> {
        assessment.replaceable.iter().map(|s| s.id).collect()
    }
}
