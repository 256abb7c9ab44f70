//! ReconcileWebhookHandler - command handler for inbound provider webhooks.
//!
//! The verify → dedup → dispatch pipeline. Signature verification and
//! payload parsing have no side effects; everything stateful happens
//! inside the reconciler.

use std::sync::Arc;

use crate::domain::billing::{ReconcileOutcome, Reconciler, WebhookError, WebhookVerifier};

/// Command to reconcile one webhook delivery.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    /// Raw request body, exactly as signed by the provider.
    pub payload: Vec<u8>,
    /// Value of the Stripe-Signature header.
    pub signature: String,
}

/// Handler wiring the verifier and the reconciliation engine.
pub struct ReconcileWebhookHandler {
    verifier: WebhookVerifier,
    reconciler: Arc<Reconciler>,
    require_livemode: bool,
}

impl ReconcileWebhookHandler {
    pub fn new(
        verifier: WebhookVerifier,
        reconciler: Arc<Reconciler>,
        require_livemode: bool,
    ) -> Self {
        Self {
            verifier,
            reconciler,
            require_livemode,
        }
    }

    /// Verify, then reconcile a webhook delivery.
    ///
    /// # Errors
    ///
    /// Verification and validation failures reject the event with no
    /// state mutated. Retryable failures are logged here and surfaced so
    /// the ingress returns 5xx and the provider redelivers.
    pub async fn handle(
        &self,
        cmd: ReconcileWebhookCommand,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let event = self
            .verifier
            .verify_and_parse(&cmd.payload, &cmd.signature)?;

        if self.require_livemode && !event.is_live() {
            tracing::warn!(event_id = %event.id, "rejected test mode event in production");
            return Err(WebhookError::TestModeRejected);
        }

        let event_id = event.id.clone();
        let event_type = event.event_type.clone();

        match self.reconciler.process(event).await {
            Ok(outcome) => {
                tracing::info!(
                    event_id = %event_id,
                    event_type = %event_type,
                    outcome = ?outcome,
                    "webhook reconciled"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error = %e,
                    retryable = e.is_retryable(),
                    "webhook reconciliation failed"
                );
                Err(e)
            }
        }
    }
}
