//! Webhook ingress module.

mod dto;
mod handlers;
mod routes;

pub use handlers::{handle_stripe_webhook, health, WebhookAppState};
pub use routes::webhook_routes;
