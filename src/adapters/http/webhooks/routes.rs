//! Axum router for the webhook ingress.

use axum::routing::post;
use axum::Router;

use super::handlers::{handle_stripe_webhook, WebhookAppState};

/// Create the webhook router.
///
/// Webhooks carry no session auth; the handler verifies the provider
/// signature instead.
///
/// # Routes
/// - `POST /stripe` - Stripe webhook deliveries
pub fn webhook_routes() -> Router<WebhookAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}
