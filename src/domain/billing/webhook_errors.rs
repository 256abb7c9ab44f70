//! Webhook error types for reconciliation.
//!
//! Defines all error conditions that can occur while processing a
//! provider notification, with HTTP status code mapping and
//! retryability semantics. The status code determines the provider's
//! redelivery behavior: 2xx acknowledges, 4xx drops, 5xx retries.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is outside the acceptable window (5 minutes).
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Required metadata entry missing from webhook payload.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Test-mode event received while livemode is required.
    #[error("Test mode event rejected")]
    TestModeRejected,

    /// No subscription row for the referenced external id.
    ///
    /// Retryable: the creating event may simply not have landed yet.
    #[error("No subscription for external id {0}")]
    SubscriptionNotFound(String),

    /// Attempted mutation is not valid for the row's current state.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Billing provider call failed.
    ///
    /// Only surfaced from paths where the provider response is required;
    /// best-effort cancellations absorb this and log instead.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Subscription or event store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Correlation buffer operation failed.
    #[error("Correlation store error: {0}")]
    Correlation(String),
}

impl WebhookError {
    /// Returns true if the provider should redeliver this webhook.
    ///
    /// Retryable errors are temporary failures that may succeed on a
    /// later attempt (store outages, eventual consistency).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Store(_)
                | WebhookError::Correlation(_)
                | WebhookError::Provider(_)
                | WebhookError::SubscriptionNotFound(_)
        )
    }

    /// Maps the error to an HTTP status code for the ingress response.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Verification and validation failures - rejected, no retry
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::TestModeRejected => StatusCode::BAD_REQUEST,

            // Server errors - provider will retry
            WebhookError::SubscriptionNotFound(_)
            | WebhookError::InvalidTransition(_)
            | WebhookError::Provider(_)
            | WebhookError::Store(_)
            | WebhookError::Correlation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Store-level failures surface as webhook errors with the right
/// retryability class.
impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::CacheError => WebhookError::Correlation(err.to_string()),
            ErrorCode::SubscriptionSuperseded | ErrorCode::InvalidStateTransition => {
                WebhookError::InvalidTransition(err.to_string())
            }
            _ => WebhookError::Store(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_signature_displays_correctly() {
        assert_eq!(format!("{}", WebhookError::InvalidSignature), "Invalid signature");
    }

    #[test]
    fn missing_field_displays_field_name() {
        let err = WebhookError::MissingField("subscription");
        assert_eq!(format!("{}", err), "Missing field: subscription");
    }

    // Retryability

    #[test]
    fn store_error_is_retryable() {
        assert!(WebhookError::Store("connection lost".to_string()).is_retryable());
    }

    #[test]
    fn correlation_error_is_retryable() {
        assert!(WebhookError::Correlation("redis timeout".to_string()).is_retryable());
    }

    #[test]
    fn subscription_not_found_is_retryable() {
        // Eventual consistency - the creating event may arrive later
        assert!(WebhookError::SubscriptionNotFound("sub_1".to_string()).is_retryable());
    }

    #[test]
    fn signature_and_validation_errors_are_not_retryable() {
        assert!(!WebhookError::InvalidSignature.is_retryable());
        assert!(!WebhookError::TimestampOutOfRange.is_retryable());
        assert!(!WebhookError::ParseError("bad json".to_string()).is_retryable());
        assert!(!WebhookError::MissingField("customer").is_retryable());
        assert!(!WebhookError::TestModeRejected.is_retryable());
    }

    // Status codes

    #[test]
    fn signature_failures_return_bad_request() {
        assert_eq!(
            WebhookError::InvalidSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::TimestampOutOfRange.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn validation_failures_return_bad_request() {
        assert_eq!(
            WebhookError::ParseError("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::MissingMetadata("user_id").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn retryable_failures_return_internal_error() {
        assert_eq!(
            WebhookError::Store("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            WebhookError::SubscriptionNotFound("sub_x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_error_maps_by_code() {
        let err: WebhookError =
            DomainError::new(ErrorCode::CacheError, "redis gone").into();
        assert!(matches!(err, WebhookError::Correlation(_)));

        let err: WebhookError =
            DomainError::new(ErrorCode::SubscriptionSuperseded, "inert").into();
        assert!(matches!(err, WebhookError::InvalidTransition(_)));

        let err: WebhookError = DomainError::database("insert failed").into();
        assert!(matches!(err, WebhookError::Store(_)));
    }
}
