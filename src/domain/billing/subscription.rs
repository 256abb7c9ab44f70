//! Subscription aggregate entity.
//!
//! One row per provider-side subscription. Rows are created by the
//! reconciliation engine when both halves of a purchase have been
//! observed, mutated in place on every later lifecycle event, and never
//! physically deleted; cancellation is a status transition.
//!
//! # Invariants
//!
//! - For any customer, at most one row is "truly active" (status active,
//!   not flagged for end-of-period cancellation, period end in the
//!   future). The application-level guard is advisory; the database
//!   partial unique index is the enforcement.
//! - The `superseded_by` relation forms a forest: a row never supersedes
//!   itself and a superseded row is inert, never mutated again.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp, UserId,
};

use super::SubscriptionStatus;

/// A customer's subscription as reconciled from provider webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Internal row identifier.
    pub id: SubscriptionId,

    /// Provider-side customer owning this subscription.
    pub customer_id: CustomerId,

    /// Internal account owning this subscription.
    ///
    /// Absent until the checkout half of the purchase has been observed.
    pub user_id: Option<UserId>,

    /// Provider-side subscription identifier (sub_... for Stripe).
    pub stripe_subscription_id: String,

    /// Provider lifecycle status, mirrored from webhook payloads.
    pub status: SubscriptionStatus,

    /// Whether the provider will cancel this subscription at period end.
    pub cancel_at_period_end: bool,

    /// Start of the current billing period.
    pub current_period_start: Timestamp,

    /// End of the current billing period.
    pub current_period_end: Timestamp,

    /// Provider price/plan identifier.
    pub plan_id: Option<String>,

    /// Row that replaced this one, if any.
    pub superseded_by: Option<SubscriptionId>,

    /// Why this row was replaced (free text, e.g. "replaced_by_sub_X").
    pub replacement_reason: Option<String>,

    /// When the row was created.
    pub created_at: Timestamp,

    /// When the row was last updated.
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates a new active subscription row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SubscriptionId,
        customer_id: CustomerId,
        user_id: Option<UserId>,
        stripe_subscription_id: impl Into<String>,
        status: SubscriptionStatus,
        period_start: Timestamp,
        period_end: Timestamp,
        plan_id: Option<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            customer_id,
            user_id,
            stripe_subscription_id: stripe_subscription_id.into(),
            status,
            cancel_at_period_end: false,
            current_period_start: period_start,
            current_period_end: period_end,
            plan_id,
            superseded_by: None,
            replacement_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A row counts toward the single-active invariant only while it is
    /// active, not flagged for end-of-period cancellation, and still
    /// inside its paid period.
    pub fn is_truly_active(&self, now: Timestamp) -> bool {
        self.superseded_by.is_none()
            && self.status == SubscriptionStatus::Active
            && !self.cancel_at_period_end
            && self.current_period_end.is_after(&now)
    }

    /// Cancelled-but-not-yet-expired or past its period end: eligible to
    /// be superseded when a new paid subscription appears.
    pub fn is_replaceable(&self, now: Timestamp) -> bool {
        self.superseded_by.is_none()
            && (self.cancel_at_period_end || !self.current_period_end.is_after(&now))
    }

    /// Already replaced by another row; never mutated again.
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// Marks this row as replaced by another subscription.
    ///
    /// # Errors
    ///
    /// Rejects self-supersession and double supersession; both would
    /// break the forest shape of the `superseded_by` relation.
    pub fn supersede(
        &mut self,
        by: SubscriptionId,
        reason: impl Into<String>,
    ) -> Result<(), DomainError> {
        if by == self.id {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "A subscription cannot supersede itself",
            ));
        }
        if self.superseded_by.is_some() {
            return Err(DomainError::new(
                ErrorCode::SubscriptionSuperseded,
                format!("Subscription {} is already superseded", self.id),
            ));
        }
        self.superseded_by = Some(by);
        self.replacement_reason = Some(reason.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Mirrors status and period fields from a provider payload.
    ///
    /// # Errors
    ///
    /// Superseded rows are inert and reject further mutation.
    pub fn mirror(
        &mut self,
        status: SubscriptionStatus,
        period_start: Timestamp,
        period_end: Timestamp,
        cancel_at_period_end: bool,
    ) -> Result<(), DomainError> {
        self.ensure_not_superseded()?;
        self.status = status;
        self.current_period_start = period_start;
        self.current_period_end = period_end;
        self.cancel_at_period_end = cancel_at_period_end;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Applies the provider's deletion event: cancelled effective now.
    pub fn cancel_now(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.ensure_not_superseded()?;
        self.status = SubscriptionStatus::Canceled;
        self.cancel_at_period_end = false;
        self.current_period_end = now;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Back-fills the owning user once the checkout half arrives.
    pub fn attach_user(&mut self, user_id: UserId) -> Result<(), DomainError> {
        self.ensure_not_superseded()?;
        self.user_id = Some(user_id);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    fn ensure_not_superseded(&self) -> Result<(), DomainError> {
        if self.is_superseded() {
            return Err(DomainError::new(
                ErrorCode::SubscriptionSuperseded,
                format!("Subscription {} is superseded and inert", self.id),
            ));
        }
        Ok(())
    }
}
