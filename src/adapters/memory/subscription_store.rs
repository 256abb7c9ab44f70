//! In-memory SubscriptionStore for tests and local development.
//!
//! Mimics the production store's behavior including the partial unique
//! index: inserting a second active, unflagged, unsuperseded row for a
//! customer fails with `DuplicateActiveSubscription`.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{Subscription, SubscriptionStatus};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp, UserId,
};
use crate::ports::SubscriptionStore;

/// Matches the predicate of the production partial unique index.
fn in_unique_index(sub: &Subscription) -> bool {
    sub.status == SubscriptionStatus::Active
        && !sub.cancel_at_period_end
        && sub.superseded_by.is_none()
}

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    rows: RwLock<Vec<Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Snapshot of all rows, for test assertions.
    pub async fn all(&self) -> Vec<Subscription> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;

        if rows.iter().any(|r| r.id == subscription.id) {
            return Err(DomainError::database("duplicate subscription id"));
        }
        if in_unique_index(subscription)
            && rows
                .iter()
                .any(|r| r.customer_id == subscription.customer_id && in_unique_index(r))
        {
            return Err(DomainError::new(
                ErrorCode::DuplicateActiveSubscription,
                "customer already has an active subscription",
            ));
        }

        rows.push(subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.id == subscription.id) {
            Some(row) => {
                *row = subscription.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "subscription not found",
            )),
        }
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|r| &r.id == id).cloned())
    }

    async fn find_by_external_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| r.stripe_subscription_id == stripe_subscription_id)
            .cloned())
    }

    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| &r.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn list_superseded_since(
        &self,
        since: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.superseded_by.is_some() && r.updated_at.is_after(&since))
            .cloned()
            .collect())
    }
}
