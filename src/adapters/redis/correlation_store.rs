//! Redis-backed CorrelationStore for production deployments.
//!
//! Entries are JSON values stored under a namespaced key with a server
//! side TTL (`SET ... EX`). This keeps pending correlations durable
//! across process restarts and visible to every instance behind the
//! load balancer.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{CorrelationStore, PendingCorrelation};

const KEY_PREFIX: &str = "billing:correlation:";

#[derive(Clone)]
pub struct RedisCorrelationStore {
    conn: MultiplexedConnection,
}

impl RedisCorrelationStore {
    /// Creates a new store over an established Redis connection.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    fn key(stripe_subscription_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, stripe_subscription_id)
    }
}

fn cache_error(e: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::CacheError, format!("Correlation store error: {}", e))
}

#[async_trait]
impl CorrelationStore for RedisCorrelationStore {
    async fn get(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<PendingCorrelation>, DomainError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::key(stripe_subscription_id))
            .await
            .map_err(cache_error)?;

        raw.map(|json| serde_json::from_str(&json).map_err(cache_error))
            .transpose()
    }

    async fn put(&self, entry: PendingCorrelation, ttl: Duration) -> Result<(), DomainError> {
        let json = serde_json::to_string(&entry).map_err(cache_error)?;
        let ttl_secs = ttl.as_secs().max(1);

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(&entry.stripe_subscription_id), json, ttl_secs)
            .await
            .map_err(cache_error)?;

        Ok(())
    }

    async fn remove(&self, stripe_subscription_id: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(stripe_subscription_id))
            .await
            .map_err(cache_error)?;

        Ok(())
    }
}
