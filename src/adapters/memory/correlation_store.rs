//! In-memory CorrelationStore for tests and local development.
//!
//! Expiry is lazy: entries past their TTL are dropped on lookup. The
//! production Redis adapter gets expiry from the server instead.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::ports::{CorrelationStore, PendingCorrelation};

#[derive(Default)]
pub struct InMemoryCorrelationStore {
    entries: RwLock<HashMap<String, (PendingCorrelation, Instant)>>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorrelationStore for InMemoryCorrelationStore {
    async fn get(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<PendingCorrelation>, DomainError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(stripe_subscription_id) {
            Some((_, expires_at)) if *expires_at <= now => {
                entries.remove(stripe_subscription_id);
                Ok(None)
            }
            Some((entry, _)) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, entry: PendingCorrelation, ttl: Duration) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            entry.stripe_subscription_id.clone(),
            (entry, Instant::now() + ttl),
        );
        Ok(())
    }

    async fn remove(&self, stripe_subscription_id: &str) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        entries.remove(stripe_subscription_id);
        Ok(())
    }
}
