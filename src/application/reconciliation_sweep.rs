//! ReconciliationSweep - periodic local-vs-provider straggler pass.
//!
//! The replacement executor's upstream cancellation is best-effort; a
//! provider outage can leave a superseded row still billable on the
//! provider. This sweep re-checks recently superseded rows and
//! re-issues the cancellation, and applies the processed-event log
//! retention policy.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::foundation::Timestamp;
use crate::ports::{BillingProvider, ProcessedEventStore, SubscriptionStore};

/// How far back the sweep looks for superseded rows.
const SWEEP_WINDOW_DAYS: i64 = 7;

/// Summary of one sweep run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Superseded rows examined.
    pub examined: usize,
    /// Rows the provider still reported billable; cancellation re-issued.
    pub stragglers_cancelled: usize,
    /// Provider lookups or cancellations that failed; retried next run.
    pub provider_failures: usize,
    /// Processed-event records purged by the retention policy.
    pub events_purged: u64,
}

/// Periodic reconciliation sweep.
pub struct ReconciliationSweep {
    subscriptions: Arc<dyn SubscriptionStore>,
    events: Arc<dyn ProcessedEventStore>,
    provider: Arc<dyn BillingProvider>,
    event_retention_days: i64,
}

impl ReconciliationSweep {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        events: Arc<dyn ProcessedEventStore>,
        provider: Arc<dyn BillingProvider>,
        event_retention_days: i64,
    ) -> Self {
        Self {
            subscriptions,
            events,
            provider,
            event_retention_days,
        }
    }

    /// Run one sweep pass.
    ///
    /// Never fails outright: per-row provider failures are counted and
    /// retried on the next run, keeping the sweep safe to schedule on a
    /// fixed interval.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let since = Timestamp::now().minus_days(SWEEP_WINDOW_DAYS);
        let superseded = match self.subscriptions.list_superseded_since(since).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "sweep could not list superseded subscriptions");
                return report;
            }
        };

        for row in superseded {
            report.examined += 1;
            let external_id = row.stripe_subscription_id.as_str();

            match self.provider.get_subscription(external_id).await {
                Ok(Some(remote)) if remote.status.is_billable() => {
                    tracing::warn!(
                        subscription = %external_id,
                        status = remote.status.as_str(),
                        "superseded subscription still billable upstream, re-issuing cancellation"
                    );
                    match self.provider.cancel_subscription(external_id, false).await {
                        Ok(_) => report.stragglers_cancelled += 1,
                        Err(e) if e.is_already_canceled() => {}
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                subscription = %external_id,
                                "sweep cancellation failed"
                            );
                            report.provider_failures += 1;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        subscription = %external_id,
                        "sweep could not check provider state"
                    );
                    report.provider_failures += 1;
                }
            }
        }

        let cutoff = Utc::now() - Duration::days(self.event_retention_days);
        match self.events.purge_before(cutoff).await {
            Ok(purged) => report.events_purged = purged,
            Err(e) => {
                tracing::warn!(error = %e, "sweep could not purge processed events");
            }
        }

        tracing::info!(
            examined = report.examined,
            stragglers_cancelled = report.stragglers_cancelled,
            provider_failures = report.provider_failures,
            events_purged = report.events_purged,
            "reconciliation sweep finished"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryProcessedEventStore, InMemorySubscriptionStore};
    use crate::domain::billing::{Subscription, SubscriptionStatus};
    use crate::domain::foundation::{CustomerId, SubscriptionId, UserId};
    use crate::ports::{BillingProviderError, ProviderSubscription};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct SweepProvider {
        billable: Vec<String>,
        cancelled: Mutex<Vec<String>>,
    }

    impl SweepProvider {
        fn new(billable: Vec<&str>) -> Self {
            Self {
                billable: billable.into_iter().map(String::from).collect(),
                cancelled: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BillingProvider for SweepProvider {
        async fn get_subscription(
            &self,
            subscription_id: &str,
        ) -> Result<Option<ProviderSubscription>, BillingProviderError> {
            let status = if self.billable.iter().any(|s| s == subscription_id) {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::Canceled
            };
            Ok(Some(ProviderSubscription {
                id: subscription_id.to_string(),
                customer_id: "cus_sweep".to_string(),
                status,
                current_period_start: 0,
                current_period_end: 0,
                cancel_at_period_end: false,
                plan_id: None,
            }))
        }

        async fn cancel_subscription(
            &self,
            subscription_id: &str,
            _at_period_end: bool,
        ) -> Result<ProviderSubscription, BillingProviderError> {
            self.cancelled.lock().unwrap().push(subscription_id.to_string());
            Ok(ProviderSubscription {
                id: subscription_id.to_string(),
                customer_id: "cus_sweep".to_string(),
                status: SubscriptionStatus::Canceled,
                current_period_start: 0,
                current_period_end: 0,
                cancel_at_period_end: false,
                plan_id: None,
            })
        }
    }

    fn superseded_row(external_id: &str) -> Subscription {
        let now = Timestamp::now();
        let mut sub = Subscription::new(
            SubscriptionId::new(),
            CustomerId::new("cus_sweep").unwrap(),
            Some(UserId::new("user-sweep").unwrap()),
            external_id,
            SubscriptionStatus::Active,
            now,
            now.add_days(30),
            None,
        );
        sub.supersede(SubscriptionId::new(), "replaced").unwrap();
        sub
    }

    #[tokio::test]
    async fn sweep_cancels_stragglers_still_billable_upstream() {
        let subscriptions = Arc::new(InMemorySubscriptionStore::new());
        subscriptions.create(&superseded_row("sub_straggler")).await.unwrap();
        subscriptions.create(&superseded_row("sub_done")).await.unwrap();

        let provider = Arc::new(SweepProvider::new(vec!["sub_straggler"]));
        let sweep = ReconciliationSweep::new(
            subscriptions,
            Arc::new(InMemoryProcessedEventStore::new()),
            provider.clone(),
            30,
        );

        let report = sweep.run_once().await;

        assert_eq!(report.examined, 2);
        assert_eq!(report.stragglers_cancelled, 1);
        assert_eq!(
            *provider.cancelled.lock().unwrap(),
            vec!["sub_straggler".to_string()]
        );
    }

    #[tokio::test]
    async fn sweep_purges_old_event_records() {
        let events = Arc::new(InMemoryProcessedEventStore::new());
        let mut old = crate::ports::ProcessedEvent::success(
            "evt_old",
            "kind",
            None,
            serde_json::json!({}),
        );
        old.processed_at = Utc::now() - Duration::days(90);
        events.record(old).await.unwrap();

        let sweep = ReconciliationSweep::new(
            Arc::new(InMemorySubscriptionStore::new()),
            events.clone(),
            Arc::new(SweepProvider::new(vec![])),
            30,
        );

        let report = sweep.run_once().await;

        assert_eq!(report.events_purged, 1);
        assert!(events.find_by_event_id("evt_old").await.unwrap().is_none());
    }
}
