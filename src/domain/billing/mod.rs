//! Billing domain - the subscription lifecycle reconciliation engine.
//!
//! Consumes asynchronous, possibly-duplicated, possibly-out-of-order
//! notifications from the billing provider and converts them into a
//! single consistent subscription record per customer.

mod guard;
mod reconciler;
mod status;
mod stripe_event;
mod subscription;
mod webhook_errors;
mod webhook_verifier;

pub use guard::{classify, ActiveSubscriptionGuard, Disposition, GuardAssessment};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use status::SubscriptionStatus;
pub use stripe_event::{
    CheckoutSessionPayload, StripeEvent, StripeEventData, StripeEventKind, SubscriptionPayload,
};
pub use subscription::Subscription;
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{SignatureHeader, WebhookVerifier};
