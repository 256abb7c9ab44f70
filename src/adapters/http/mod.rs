//! HTTP adapters - axum routers and middleware layers.

pub mod webhooks;

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use webhooks::{health, webhook_routes, WebhookAppState};

/// Assemble the service router with its middleware stack.
pub fn api_router(state: WebhookAppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/webhooks", webhook_routes())
        .with_state(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}
