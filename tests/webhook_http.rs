//! Webhook ingress contract tests.
//!
//! Drives the assembled axum router directly and asserts the response
//! shapes the provider integration depends on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

use reviewdeck::adapters::http::{api_router, webhooks::WebhookAppState};
use reviewdeck::adapters::memory::{
    InMemoryCorrelationStore, InMemoryProcessedEventStore, InMemorySubscriptionStore,
};
use reviewdeck::application::ReconcileWebhookHandler;
use reviewdeck::domain::billing::{Reconciler, SubscriptionStatus, WebhookVerifier};
use reviewdeck::ports::{BillingProvider, BillingProviderError, ProviderSubscription};

const SECRET: &str = "whsec_http_contract_test";

struct NullBillingProvider;

#[async_trait]
impl BillingProvider for NullBillingProvider {
    async fn get_subscription(
        &self,
        _subscription_id: &str,
    ) -> Result<Option<ProviderSubscription>, BillingProviderError> {
        Ok(None)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        _at_period_end: bool,
    ) -> Result<ProviderSubscription, BillingProviderError> {
        Ok(ProviderSubscription {
            id: subscription_id.to_string(),
            customer_id: "cus_http".to_string(),
            status: SubscriptionStatus::Canceled,
            current_period_start: 0,
            current_period_end: 0,
            cancel_at_period_end: false,
            plan_id: None,
        })
    }
}

fn app() -> axum::Router {
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(InMemorySubscriptionStore::new()),
        Arc::new(InMemoryProcessedEventStore::new()),
        Arc::new(InMemoryCorrelationStore::new()),
        Arc::new(NullBillingProvider),
        Duration::from_secs(3600),
    ));
    let state = WebhookAppState {
        reconcile_handler: Arc::new(ReconcileWebhookHandler::new(
            WebhookVerifier::new(SECRET),
            reconciler,
            false,
        )),
    };
    api_router(state, Duration::from_secs(30))
}

fn sign(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signed = format!("{}.{}", timestamp, payload);
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(signed.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn checkout_payload(event_id: &str, sub: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": {
                "id": "cs_http",
                "customer": "cus_http",
                "subscription": sub,
                "metadata": {"user_id": "user-http"}
            }
        },
        "livemode": false,
        "api_version": "2023-10-16"
    })
    .to_string()
}

fn webhook_request(payload: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("Stripe-Signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn valid_delivery_returns_received_true() {
    let app = app();
    let payload = checkout_payload("evt_http_1", "sub_http_1");

    let response = app
        .oneshot(webhook_request(&payload, &sign(&payload)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"received": true}));
}

#[tokio::test]
async fn redelivery_returns_already_processed() {
    let app = app();
    let payload = checkout_payload("evt_http_1", "sub_http_1");

    let first = app
        .clone()
        .oneshot(webhook_request(&payload, &sign(&payload)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(webhook_request(&payload, &sign(&payload)))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        body_json(second).await,
        serde_json::json!({"status": "already_processed"})
    );
}

#[tokio::test]
async fn duplicate_purchase_returns_blocked() {
    let app = app();
    let first = checkout_payload("evt_http_1", "sub_http_1");
    app.clone()
        .oneshot(webhook_request(&first, &sign(&first)))
        .await
        .unwrap();

    let second = checkout_payload("evt_http_2", "sub_http_2");
    let response = app
        .oneshot(webhook_request(&second, &sign(&second)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"status": "blocked", "reason": "blocked_duplicate"})
    );
}

#[tokio::test]
async fn invalid_signature_returns_bad_request() {
    let app = app();
    let payload = checkout_payload("evt_http_1", "sub_http_1");
    let bogus = format!("t={},v1={}", chrono::Utc::now().timestamp(), "a".repeat(64));

    let response = app
        .oneshot(webhook_request(&payload, &bogus))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_signature_header_returns_bad_request() {
    let app = app();
    let payload = checkout_payload("evt_http_1", "sub_http_1");

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .body(Body::from(payload))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_payload_returns_bad_request() {
    let app = app();
    let payload = "not json at all";

    let response = app
        .oneshot(webhook_request(payload, &sign(payload)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoint_responds_ok() {
    let app = app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
