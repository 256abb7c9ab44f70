//! Ports - contracts between the domain and the outside world.
//!
//! Each port is an async trait implemented by one or more adapters.
//! The reconciliation engine depends only on these traits.

mod billing_provider;
mod correlation_store;
mod processed_event_store;
mod subscription_store;

pub use billing_provider::{
    BillingProvider, BillingProviderError, BillingProviderErrorCode, ProviderSubscription,
};
pub use correlation_store::{CorrelationStore, PendingCorrelation};
pub use processed_event_store::{InsertOutcome, ProcessedEvent, ProcessedEventStore};
pub use subscription_store::SubscriptionStore;
