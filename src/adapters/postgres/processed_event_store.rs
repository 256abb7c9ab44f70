//! PostgreSQL implementation of ProcessedEventStore.
//!
//! The PRIMARY KEY on event_id plus `ON CONFLICT DO NOTHING` gives the
//! first-writer-wins semantics concurrent deliveries rely on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{InsertOutcome, ProcessedEvent, ProcessedEventStore};

pub struct PostgresProcessedEventStore {
    pool: PgPool,
}

impl PostgresProcessedEventStore {
    /// Creates a new store backed by the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessedEventRow {
    event_id: String,
    event_kind: String,
    stripe_subscription_id: Option<String>,
    outcome: String,
    detail: Option<String>,
    payload: serde_json::Value,
    processed_at: DateTime<Utc>,
}

impl From<ProcessedEventRow> for ProcessedEvent {
    fn from(row: ProcessedEventRow) -> Self {
        ProcessedEvent {
            event_id: row.event_id,
            event_kind: row.event_kind,
            stripe_subscription_id: row.stripe_subscription_id,
            outcome: row.outcome,
            detail: row.detail,
            payload: row.payload,
            processed_at: row.processed_at,
        }
    }
}

#[async_trait]
impl ProcessedEventStore for PostgresProcessedEventStore {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, DomainError> {
        let row: Option<ProcessedEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_kind, stripe_subscription_id, outcome,
                   detail, payload, processed_at
            FROM processed_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to find processed event: {}", e),
            )
        })?;

        Ok(row.map(ProcessedEvent::from))
    }

    async fn record(&self, event: ProcessedEvent) -> Result<InsertOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (
                event_id, event_kind, stripe_subscription_id, outcome,
                detail, payload, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.event_kind)
        .bind(&event.stripe_subscription_id)
        .bind(&event.outcome)
        .bind(&event.detail)
        .bind(&event.payload)
        .bind(event.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to record processed event: {}", e),
            )
        })?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to purge processed events: {}", e),
                )
            })?;

        Ok(result.rows_affected())
    }
}
