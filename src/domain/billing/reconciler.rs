//! Reconciler - converts provider webhook events into consistent
//! subscription state.
//!
//! This is the coordination layer between the webhook ingress and the
//! stores, ensuring each event is processed exactly once and that the
//! single-truly-active-per-customer invariant holds under duplicated,
//! out-of-order delivery.
//!
//! ## Processing steps
//!
//! 1. Check the processed-event log (idempotency)
//! 2. Dispatch on the parsed event kind
//! 3. Record the outcome, only after the mutation committed
//!
//! ## Race Condition Handling
//!
//! Two concurrent deliveries of the same event both pass step 1; the
//! first to write the record wins (PRIMARY KEY on event id) and the
//! other observes `AlreadyExists`. Two concurrent creations for the
//! same customer both pass the guard; the database partial unique index
//! rejects the loser, which takes the blocked path.
//!
//! ## Failure policy
//!
//! A failed handler writes no processed-event record, so the provider's
//! redelivery retries it. Short-circuit outcomes (blocked duplicate,
//! ignored kind) record immediately since no further mutation follows.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::{
    CustomerId, ErrorCode, SubscriptionId, Timestamp, UserId,
};
use crate::ports::{
    BillingProvider, CorrelationStore, InsertOutcome, PendingCorrelation, ProcessedEvent,
    ProcessedEventStore, SubscriptionStore,
};

use super::guard::ActiveSubscriptionGuard;
use super::stripe_event::{CheckoutSessionPayload, StripeEvent, StripeEventKind, SubscriptionPayload};
use super::webhook_errors::WebhookError;
use super::{Subscription, SubscriptionStatus};

/// Reason recorded when a duplicate purchase is refused.
const BLOCKED_DUPLICATE: &str = "blocked_duplicate";

/// Fallback period length when the provider half is unavailable at
/// creation time; corrected by the next subscription.updated mirror.
const FALLBACK_PERIOD_DAYS: i64 = 30;

/// Result of reconciling one webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Event was processed and state updated (or buffered).
    Processed,
    /// Event was already processed (idempotent skip).
    AlreadyProcessed,
    /// Duplicate purchase refused; the new provider subscription was
    /// cancelled upstream.
    Blocked { reason: String },
    /// Event kind carries nothing for us; acknowledged.
    Ignored,
}

/// Internal handler verdict, carrying what the processed-event record needs.
enum HandlerVerdict {
    Applied { subscription_id: Option<String> },
    Buffered { subscription_id: String },
    Blocked { subscription_id: Option<String>, reason: String },
    Ignored { reason: String },
}

/// Everything known about a purchase at the moment a row is created.
struct CreationContext {
    external_id: String,
    customer_id: CustomerId,
    user_id: Option<UserId>,
    period_start: Option<Timestamp>,
    period_end: Option<Timestamp>,
    plan_id: Option<String>,
}

/// The subscription lifecycle reconciliation engine.
pub struct Reconciler {
    subscriptions: Arc<dyn SubscriptionStore>,
    events: Arc<dyn ProcessedEventStore>,
    correlations: Arc<dyn CorrelationStore>,
    provider: Arc<dyn BillingProvider>,
    guard: ActiveSubscriptionGuard,
    correlation_ttl: Duration,
}

impl Reconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        events: Arc<dyn ProcessedEventStore>,
        correlations: Arc<dyn CorrelationStore>,
        provider: Arc<dyn BillingProvider>,
        correlation_ttl: Duration,
    ) -> Self {
        let guard = ActiveSubscriptionGuard::new(subscriptions.clone());
        Self {
            subscriptions,
            events,
            correlations,
            provider,
            guard,
            correlation_ttl,
        }
    }

    /// Process a webhook event exactly once.
    ///
    /// # Returns
    ///
    /// - `Ok(ReconcileOutcome::Processed)` - state updated
    /// - `Ok(ReconcileOutcome::AlreadyProcessed)` - idempotent skip
    /// - `Ok(ReconcileOutcome::Blocked { .. })` - duplicate purchase refused
    /// - `Ok(ReconcileOutcome::Ignored)` - event kind not handled
    /// - `Err(_)` - processing failed; no record written, safe to redeliver
    pub async fn process(&self, event: StripeEvent) -> Result<ReconcileOutcome, WebhookError> {
        if self.events.find_by_event_id(&event.id).await?.is_some() {
            tracing::debug!(event_id = %event.id, "duplicate delivery, already processed");
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        let verdict = match event.kind() {
            StripeEventKind::CheckoutSessionCompleted => {
                self.handle_checkout_completed(&event).await?
            }
            StripeEventKind::SubscriptionCreated => {
                self.handle_subscription_created(&event).await?
            }
            StripeEventKind::SubscriptionUpdated => {
                self.handle_subscription_updated(&event).await?
            }
            StripeEventKind::SubscriptionDeleted => {
                self.handle_subscription_deleted(&event).await?
            }
            StripeEventKind::SubscriptionPendingUpdateApplied
            | StripeEventKind::SubscriptionPendingUpdateExpired
            | StripeEventKind::SubscriptionTrialWillEnd => {
                self.handle_subscription_mirror(&event).await?
            }
            StripeEventKind::Unknown => HandlerVerdict::Ignored {
                reason: format!("no handler for event type: {}", event.event_type),
            },
        };

        let payload = serde_json::to_value(&event)
            .map_err(|e| WebhookError::ParseError(format!("failed to serialize event: {}", e)))?;

        let record = match &verdict {
            HandlerVerdict::Applied { subscription_id } => ProcessedEvent::success(
                &event.id,
                &event.event_type,
                subscription_id.clone(),
                payload,
            ),
            HandlerVerdict::Buffered { subscription_id } => ProcessedEvent::success(
                &event.id,
                &event.event_type,
                Some(subscription_id.clone()),
                payload,
            ),
            HandlerVerdict::Blocked {
                subscription_id,
                reason,
            } => ProcessedEvent::blocked(
                &event.id,
                &event.event_type,
                subscription_id.clone(),
                reason.clone(),
                payload,
            ),
            HandlerVerdict::Ignored { reason } => {
                ProcessedEvent::ignored(&event.id, &event.event_type, reason.clone(), payload)
            }
        };

        match self.events.record(record).await? {
            InsertOutcome::Inserted => Ok(match verdict {
                HandlerVerdict::Applied { .. } | HandlerVerdict::Buffered { .. } => {
                    ReconcileOutcome::Processed
                }
                HandlerVerdict::Blocked { reason, .. } => ReconcileOutcome::Blocked { reason },
                HandlerVerdict::Ignored { .. } => ReconcileOutcome::Ignored,
            }),
            // Lost the record race; another delivery already handled it.
            InsertOutcome::AlreadyExists => Ok(ReconcileOutcome::AlreadyProcessed),
        }
    }

    // ── checkout.session.completed ────────────────────────────────────

    async fn handle_checkout_completed(
        &self,
        event: &StripeEvent,
    ) -> Result<HandlerVerdict, WebhookError> {
        let session: CheckoutSessionPayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let external_id = session
            .subscription
            .clone()
            .ok_or(WebhookError::MissingField("subscription"))?;
        let customer_id = session
            .customer
            .as_deref()
            .and_then(|c| CustomerId::new(c).ok())
            .ok_or(WebhookError::MissingField("customer"))?;
        let user_id = session
            .user_id()
            .and_then(|u| UserId::new(u).ok())
            .ok_or(WebhookError::MissingMetadata("user_id"))?;

        // The provider half may have materialized the row first (or this
        // is a redelivery under a fresh event id): confirm ownership.
        if let Some(mut existing) = self.subscriptions.find_by_external_id(&external_id).await? {
            if !existing.is_superseded() && existing.user_id.is_none() {
                existing.attach_user(user_id)?;
                self.subscriptions.update(&existing).await?;
            }
            self.correlations.remove(&external_id).await?;
            return Ok(HandlerVerdict::Applied {
                subscription_id: Some(external_id),
            });
        }

        // Full data in hand; any buffered provider half enriches the row.
        let buffered = self.correlations.get(&external_id).await?;
        let (period_start, period_end, plan_id) = match buffered {
            Some(half) => (half.current_period_start, half.current_period_end, half.plan_id),
            None => (None, None, None),
        };

        self.create_reconciled(CreationContext {
            external_id,
            customer_id,
            user_id: Some(user_id),
            period_start,
            period_end,
            plan_id,
        })
        .await
    }

    // ── customer.subscription.created ─────────────────────────────────

    async fn handle_subscription_created(
        &self,
        event: &StripeEvent,
    ) -> Result<HandlerVerdict, WebhookError> {
        let payload: SubscriptionPayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let customer_id = CustomerId::new(payload.customer.as_str())
            .map_err(|_| WebhookError::MissingField("customer"))?;

        // Checkout half landed first and created the row: mirror the
        // provider fields onto it.
        if let Some(mut existing) = self.subscriptions.find_by_external_id(&payload.id).await? {
            if existing.is_superseded() {
                return Ok(HandlerVerdict::Ignored {
                    reason: "subscription row is superseded".to_string(),
                });
            }
            existing.mirror(
                SubscriptionStatus::parse(&payload.status),
                Timestamp::from_unix_secs(payload.current_period_start),
                Timestamp::from_unix_secs(payload.current_period_end),
                payload.cancel_at_period_end,
            )?;
            if let Some(plan) = payload.plan_id() {
                existing.plan_id = Some(plan.to_string());
            }
            self.subscriptions.update(&existing).await?;
            return Ok(HandlerVerdict::Applied {
                subscription_id: Some(payload.id),
            });
        }

        // A parked checkout half means both halves are now observed.
        if let Some(parked) = self.correlations.get(&payload.id).await? {
            if parked.user_id.is_some() {
                return self
                    .create_reconciled(CreationContext {
                        external_id: payload.id.clone(),
                        customer_id,
                        user_id: parked.user_id,
                        period_start: Some(Timestamp::from_unix_secs(payload.current_period_start)),
                        period_end: Some(Timestamp::from_unix_secs(payload.current_period_end)),
                        plan_id: payload.plan_id().map(str::to_string),
                    })
                    .await;
            }
        }

        // First sighting: park this half until the checkout event arrives.
        let entry = PendingCorrelation {
            stripe_subscription_id: payload.id.clone(),
            customer_id,
            user_id: None,
            current_period_start: Some(Timestamp::from_unix_secs(payload.current_period_start)),
            current_period_end: Some(Timestamp::from_unix_secs(payload.current_period_end)),
            plan_id: payload.plan_id().map(str::to_string),
            inserted_at: Timestamp::now(),
        };
        self.correlations.put(entry, self.correlation_ttl).await?;
        tracing::debug!(
            subscription = %payload.id,
            "buffered provider half awaiting checkout completion"
        );

        Ok(HandlerVerdict::Buffered {
            subscription_id: payload.id,
        })
    }

    // ── customer.subscription.updated ─────────────────────────────────

    async fn handle_subscription_updated(
        &self,
        event: &StripeEvent,
    ) -> Result<HandlerVerdict, WebhookError> {
        self.mirror_provider_fields(event).await
    }

    // ── pending_update_applied / pending_update_expired / trial_will_end ──

    async fn handle_subscription_mirror(
        &self,
        event: &StripeEvent,
    ) -> Result<HandlerVerdict, WebhookError> {
        self.mirror_provider_fields(event).await
    }

    async fn mirror_provider_fields(
        &self,
        event: &StripeEvent,
    ) -> Result<HandlerVerdict, WebhookError> {
        let payload: SubscriptionPayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let mut row = self
            .subscriptions
            .find_by_external_id(&payload.id)
            .await?
            .ok_or_else(|| WebhookError::SubscriptionNotFound(payload.id.clone()))?;

        if row.is_superseded() {
            return Ok(HandlerVerdict::Ignored {
                reason: "subscription row is superseded".to_string(),
            });
        }

        row.mirror(
            SubscriptionStatus::parse(&payload.status),
            Timestamp::from_unix_secs(payload.current_period_start),
            Timestamp::from_unix_secs(payload.current_period_end),
            payload.cancel_at_period_end,
        )?;
        if let Some(plan) = payload.plan_id() {
            row.plan_id = Some(plan.to_string());
        }
        self.subscriptions.update(&row).await?;

        Ok(HandlerVerdict::Applied {
            subscription_id: Some(payload.id),
        })
    }

    // ── customer.subscription.deleted ─────────────────────────────────

    async fn handle_subscription_deleted(
        &self,
        event: &StripeEvent,
    ) -> Result<HandlerVerdict, WebhookError> {
        let payload: SubscriptionPayload = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let row = self.subscriptions.find_by_external_id(&payload.id).await?;
        let mut row = match row {
            Some(row) => row,
            None => {
                // Deleted before the purchase ever materialized: drop the
                // orphaned half, nothing else to do.
                if self.correlations.get(&payload.id).await?.is_some() {
                    self.correlations.remove(&payload.id).await?;
                    return Ok(HandlerVerdict::Ignored {
                        reason: "subscription deleted before correlation completed".to_string(),
                    });
                }
                return Err(WebhookError::SubscriptionNotFound(payload.id));
            }
        };

        if row.is_superseded() {
            // Expected aftermath of a replacement's upstream cancellation.
            return Ok(HandlerVerdict::Ignored {
                reason: "subscription row is superseded".to_string(),
            });
        }

        row.cancel_now(Timestamp::now())?;
        self.subscriptions.update(&row).await?;

        Ok(HandlerVerdict::Applied {
            subscription_id: Some(payload.id),
        })
    }

    // ── creation path (guard → replace → insert) ──────────────────────

    async fn create_reconciled(
        &self,
        ctx: CreationContext,
    ) -> Result<HandlerVerdict, WebhookError> {
        let now = Timestamp::now();
        let assessment = self
            .guard
            .assess(&ctx.customer_id, ctx.user_id.as_ref(), &ctx.external_id, now)
            .await?;

        if assessment.is_blocked() {
            tracing::info!(
                customer = %ctx.customer_id,
                subscription = %ctx.external_id,
                "customer already holds an active subscription, blocking duplicate"
            );
            self.cancel_upstream(&ctx.external_id).await;
            return Ok(HandlerVerdict::Blocked {
                subscription_id: Some(ctx.external_id),
                reason: BLOCKED_DUPLICATE.to_string(),
            });
        }

        let new_id = SubscriptionId::new();
        for mut old in assessment.replaceable {
            self.replace(&mut old, new_id, &ctx.external_id).await?;
        }

        let (period_start, period_end, plan_id) = self.resolve_creation_fields(&ctx, now).await;

        let subscription = Subscription::new(
            new_id,
            ctx.customer_id.clone(),
            ctx.user_id.clone(),
            &ctx.external_id,
            SubscriptionStatus::Active,
            period_start,
            period_end,
            plan_id,
        );

        match self.subscriptions.create(&subscription).await {
            Ok(()) => {}
            Err(e) if e.code == ErrorCode::DuplicateActiveSubscription => {
                // Guard passed but a concurrent creation won the index
                // race. Same blocked path as if the guard had caught it.
                tracing::warn!(
                    customer = %ctx.customer_id,
                    subscription = %ctx.external_id,
                    "lost creation race, blocking duplicate"
                );
                self.cancel_upstream(&ctx.external_id).await;
                return Ok(HandlerVerdict::Blocked {
                    subscription_id: Some(ctx.external_id),
                    reason: BLOCKED_DUPLICATE.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.correlations.remove(&ctx.external_id).await?;

        tracing::info!(
            customer = %ctx.customer_id,
            subscription = %ctx.external_id,
            "subscription reconciled as active"
        );

        Ok(HandlerVerdict::Applied {
            subscription_id: Some(ctx.external_id),
        })
    }

    /// Determine period bounds and plan for a new row.
    ///
    /// Preference order: fields carried by the provider half, then a
    /// provider lookup, then a fallback window that the next update
    /// event corrects.
    async fn resolve_creation_fields(
        &self,
        ctx: &CreationContext,
        now: Timestamp,
    ) -> (Timestamp, Timestamp, Option<String>) {
        if let (Some(start), Some(end)) = (ctx.period_start, ctx.period_end) {
            return (start, end, ctx.plan_id.clone());
        }

        match self.provider.get_subscription(&ctx.external_id).await {
            Ok(Some(remote)) => (
                Timestamp::from_unix_secs(remote.current_period_start),
                Timestamp::from_unix_secs(remote.current_period_end),
                remote.plan_id,
            ),
            Ok(None) => (now, now.add_days(FALLBACK_PERIOD_DAYS), ctx.plan_id.clone()),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subscription = %ctx.external_id,
                    "could not fetch subscription from provider, using fallback period"
                );
                (now, now.add_days(FALLBACK_PERIOD_DAYS), ctx.plan_id.clone())
            }
        }
    }

    /// Replacement executor: supersede locally, then best-effort cancel
    /// upstream.
    ///
    /// The local update must commit: it is what keeps the partial
    /// unique index clear for the incoming row. The upstream
    /// cancellation is advisory; local state is the source of truth for
    /// blocking future duplicates.
    async fn replace(
        &self,
        old: &mut Subscription,
        new_id: SubscriptionId,
        new_external_id: &str,
    ) -> Result<(), WebhookError> {
        old.supersede(new_id, format!("replaced_by_{}", new_external_id))?;
        self.subscriptions.update(old).await?;

        tracing::info!(
            old_subscription = %old.stripe_subscription_id,
            new_subscription = %new_external_id,
            "superseded replaceable subscription"
        );

        match self.provider.get_subscription(&old.stripe_subscription_id).await {
            Ok(Some(remote)) if remote.status.is_billable() => {
                self.cancel_upstream(&old.stripe_subscription_id).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subscription = %old.stripe_subscription_id,
                    "could not check provider state, attempting cancellation anyway"
                );
                self.cancel_upstream(&old.stripe_subscription_id).await;
            }
        }

        Ok(())
    }

    /// Best-effort upstream cancellation; failures are logged, never
    /// propagated.
    async fn cancel_upstream(&self, external_id: &str) {
        match self.provider.cancel_subscription(external_id, false).await {
            Ok(_) => {
                tracing::info!(subscription = %external_id, "cancelled subscription upstream");
            }
            Err(e) if e.is_already_canceled() => {
                tracing::debug!(subscription = %external_id, "subscription already cancelled upstream");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subscription = %external_id,
                    "upstream cancellation failed, local state remains authoritative"
                );
            }
        }
    }
}
