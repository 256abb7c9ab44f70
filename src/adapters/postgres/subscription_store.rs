//! PostgreSQL implementation of SubscriptionStore.
//!
//! The `subscriptions_one_active_per_customer` partial unique index is
//! what actually enforces the single-truly-active invariant; this
//! adapter surfaces its violation as `DuplicateActiveSubscription` so
//! the reconciler can take the blocked path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{Subscription, SubscriptionStatus};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp, UserId,
};
use crate::ports::SubscriptionStore;

/// Name of the partial unique index created by the billing migration.
const ONE_ACTIVE_INDEX: &str = "subscriptions_one_active_per_customer";

pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Creates a new store backed by the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    customer_id: String,
    user_id: Option<String>,
    stripe_subscription_id: String,
    status: String,
    cancel_at_period_end: bool,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    plan_id: Option<String>,
    superseded_by: Option<Uuid>,
    replacement_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let customer_id = CustomerId::new(row.customer_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid customer_id: {}", e))
        })?;
        let user_id = row
            .user_id
            .map(UserId::new)
            .transpose()
            .map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            customer_id,
            user_id,
            stripe_subscription_id: row.stripe_subscription_id,
            status: SubscriptionStatus::parse(&row.status),
            cancel_at_period_end: row.cancel_at_period_end,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            plan_id: row.plan_id,
            superseded_by: row.superseded_by.map(SubscriptionId::from_uuid),
            replacement_reason: row.replacement_reason,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, customer_id, user_id, stripe_subscription_id, status,
           cancel_at_period_end, current_period_start, current_period_end,
           plan_id, superseded_by, replacement_reason, created_at, updated_at
    FROM subscriptions
"#;

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, customer_id, user_id, stripe_subscription_id, status,
                cancel_at_period_end, current_period_start, current_period_end,
                plan_id, superseded_by, replacement_reason, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.customer_id.as_str())
        .bind(subscription.user_id.as_ref().map(|u| u.as_str()))
        .bind(&subscription.stripe_subscription_id)
        .bind(subscription.status.as_str())
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(&subscription.plan_id)
        .bind(subscription.superseded_by.map(|id| *id.as_uuid()))
        .bind(&subscription.replacement_reason)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(ONE_ACTIVE_INDEX) {
                    return DomainError::new(
                        ErrorCode::DuplicateActiveSubscription,
                        "Customer already has an active subscription",
                    );
                }
            }
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to create subscription: {}", e),
            )
        })?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                user_id = $2,
                status = $3,
                cancel_at_period_end = $4,
                current_period_start = $5,
                current_period_end = $6,
                plan_id = $7,
                superseded_by = $8,
                replacement_reason = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_ref().map(|u| u.as_str()))
        .bind(subscription.status.as_str())
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(&subscription.plan_id)
        .bind(subscription.superseded_by.map(|id| *id.as_uuid()))
        .bind(&subscription.replacement_reason)
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update subscription: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            ));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::new(
                        ErrorCode::DatabaseError,
                        format!("Failed to find subscription: {}", e),
                    )
                })?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_external_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE stripe_subscription_id = $1", SELECT_COLUMNS))
                .bind(stripe_subscription_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::new(
                        ErrorCode::DatabaseError,
                        format!("Failed to find subscription: {}", e),
                    )
                })?;

        row.map(Subscription::try_from).transpose()
    }

    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE customer_id = $1", SELECT_COLUMNS))
                .bind(customer_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::new(
                        ErrorCode::DatabaseError,
                        format!("Failed to list subscriptions: {}", e),
                    )
                })?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE user_id = $1", SELECT_COLUMNS))
                .bind(user_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::new(
                        ErrorCode::DatabaseError,
                        format!("Failed to list subscriptions: {}", e),
                    )
                })?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn list_superseded_since(
        &self,
        since: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE superseded_by IS NOT NULL AND updated_at > $1",
            SELECT_COLUMNS
        ))
        .bind(since.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to list superseded subscriptions: {}", e),
            )
        })?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
