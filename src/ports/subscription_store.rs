//! Subscription store port.
//!
//! Defines the contract for persisting and retrieving Subscription
//! aggregates. A customer may be identified through either channel
//! (provider customer id or internal user id), so both lookups exist.
//!
//! # Concurrency
//!
//! `create` must be backed by the partial unique index that allows at
//! most one truly-active row per customer. The guard's read-then-write
//! is advisory; implementations surface a constraint violation as
//! `ErrorCode::DuplicateActiveSubscription` so the caller can take the
//! blocked path.

use async_trait::async_trait;

use crate::domain::billing::Subscription;
use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId, Timestamp, UserId};

/// Store port for Subscription aggregate persistence.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a new subscription row.
    ///
    /// # Errors
    ///
    /// - `DuplicateActiveSubscription` if the customer already holds an
    ///   active row (database constraint, closes the guard race)
    /// - `DatabaseError` on persistence failure
    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update an existing subscription row in place.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the row doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Find a row by its internal id.
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Find a row by the provider-side subscription id.
    ///
    /// This is the primary lookup for lifecycle events, which carry only
    /// provider identifiers.
    async fn find_by_external_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// All rows belonging to a provider customer.
    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// All rows belonging to an internal user.
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError>;

    /// Rows superseded since the given time.
    ///
    /// Used by the reconciliation sweep to find replacements whose
    /// upstream cancellation may not have landed.
    async fn list_superseded_since(
        &self,
        since: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError>;
}
