//! Webhook ingress handlers.
//!
//! A single POST endpoint accepting the raw body plus signature header.
//! Webhooks are not authenticated like user routes; the signature is
//! the authentication.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::application::{ReconcileWebhookCommand, ReconcileWebhookHandler};
use crate::domain::billing::{ReconcileOutcome, WebhookError};

use super::dto::{ErrorResponse, WebhookAck};

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookAppState {
    pub reconcile_handler: Arc<ReconcileWebhookHandler>,
}

/// POST /webhooks/stripe
pub async fn handle_stripe_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get("Stripe-Signature").and_then(|v| v.to_str().ok()) {
        Some(signature) => signature.to_string(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "MISSING_SIGNATURE",
                    "Missing Stripe-Signature header",
                )),
            )
                .into_response();
        }
    };

    let cmd = ReconcileWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match state.reconcile_handler.handle(cmd).await {
        Ok(ReconcileOutcome::Processed) | Ok(ReconcileOutcome::Ignored) => {
            (StatusCode::OK, Json(WebhookAck::received())).into_response()
        }
        Ok(ReconcileOutcome::AlreadyProcessed) => {
            (StatusCode::OK, Json(WebhookAck::already_processed())).into_response()
        }
        Ok(ReconcileOutcome::Blocked { reason }) => {
            (StatusCode::OK, Json(WebhookAck::blocked(reason))).into_response()
        }
        Err(e) => webhook_error_response(e),
    }
}

fn webhook_error_response(e: WebhookError) -> Response {
    let code = match &e {
        WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => "INVALID_SIGNATURE",
        WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
        WebhookError::ParseError(_) => "INVALID_PAYLOAD",
        WebhookError::MissingField(_) | WebhookError::MissingMetadata(_) => "VALIDATION_FAILED",
        WebhookError::TestModeRejected => "TEST_MODE_REJECTED",
        _ => "PROCESSING_FAILED",
    };
    (e.status_code(), Json(ErrorResponse::new(code, e.to_string()))).into_response()
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
