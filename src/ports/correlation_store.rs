//! CorrelationStore port - transient buffer matching the two halves of a
//! purchase.
//!
//! A purchase surfaces as two independently-delivered events: the
//! checkout session completion (which knows the internal user) and the
//! provider-side subscription creation (which knows period bounds and
//! plan). Whichever arrives first without enough context to materialize
//! the row is parked here, keyed by the external subscription id, until
//! its counterpart shows up or the entry expires.
//!
//! Entries must survive process restarts and be visible across
//! horizontally-scaled instances, so production backs this with Redis.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, DomainError, Timestamp, UserId};

/// One buffered half of a two-part subscription creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCorrelation {
    /// Provider subscription id the halves correlate on.
    pub stripe_subscription_id: String,

    /// Owning provider customer.
    pub customer_id: CustomerId,

    /// Owning internal user; present only on the checkout half.
    pub user_id: Option<UserId>,

    /// Period start carried by the provider half, if that half arrived.
    pub current_period_start: Option<Timestamp>,

    /// Period end carried by the provider half, if that half arrived.
    pub current_period_end: Option<Timestamp>,

    /// Plan carried by the provider half, if that half arrived.
    pub plan_id: Option<String>,

    /// When the half was buffered.
    pub inserted_at: Timestamp,
}

/// Port for the TTL-expiring correlation buffer.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Fetch the buffered half for an external subscription id, if any.
    async fn get(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<PendingCorrelation>, DomainError>;

    /// Buffer a half, replacing any existing entry for the same key.
    ///
    /// The entry expires after `ttl` if never consumed.
    async fn put(&self, entry: PendingCorrelation, ttl: Duration) -> Result<(), DomainError>;

    /// Remove the entry once the matching half has been consumed.
    async fn remove(&self, stripe_subscription_id: &str) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_correlation_serializes_for_keyed_storage() {
        let entry = PendingCorrelation {
            stripe_subscription_id: "sub_123".to_string(),
            customer_id: CustomerId::new("cus_abc").unwrap(),
            user_id: None,
            current_period_start: Some(Timestamp::from_unix_secs(1_704_067_200)),
            current_period_end: Some(Timestamp::from_unix_secs(1_706_745_600)),
            plan_id: Some("price_monthly".to_string()),
            inserted_at: Timestamp::now(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: PendingCorrelation = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, entry);
    }

    // Trait object safety test
    #[test]
    fn correlation_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn CorrelationStore) {}
    }
}
