//! In-memory ProcessedEventStore for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::ports::{InsertOutcome, ProcessedEvent, ProcessedEventStore};

#[derive(Default)]
pub struct InMemoryProcessedEventStore {
    records: RwLock<HashMap<String, ProcessedEvent>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, DomainError> {
        let records = self.records.read().await;
        Ok(records.get(event_id).cloned())
    }

    async fn record(&self, event: ProcessedEvent) -> Result<InsertOutcome, DomainError> {
        let mut records = self.records.write().await;
        if records.contains_key(&event.event_id) {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            records.insert(event.event_id.clone(), event);
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.processed_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_returns_none_for_new_event() {
        let store = InMemoryProcessedEventStore::new();
        assert!(store.find_by_event_id("evt_new").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_returns_inserted_then_already_exists() {
        let store = InMemoryProcessedEventStore::new();
        let record = ProcessedEvent::success("evt_dup", "kind", None, serde_json::json!({}));

        assert_eq!(
            store.record(record.clone()).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(store.record(record).await.unwrap(), InsertOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn purge_before_removes_old_records() {
        let store = InMemoryProcessedEventStore::new();
        let mut old = ProcessedEvent::success("evt_old", "kind", None, serde_json::json!({}));
        old.processed_at = Utc::now() - chrono::Duration::days(60);
        let new = ProcessedEvent::success("evt_new", "kind", None, serde_json::json!({}));

        store.record(old).await.unwrap();
        store.record(new).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        let deleted = store.purge_before(cutoff).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(store.find_by_event_id("evt_old").await.unwrap().is_none());
        assert!(store.find_by_event_id("evt_new").await.unwrap().is_some());
    }
}
