//! Stripe billing provider client.
//!
//! Implements the `BillingProvider` port over Stripe's REST API with
//! bounded retry. The engine only ever calls this best-effort or behind
//! a fallback, so a definitive failure here degrades gracefully.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeClientConfig::new(api_key);
//! let client = StripeBillingClient::new(config);
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::ports::{
    BillingProvider, BillingProviderError, BillingProviderErrorCode, ProviderSubscription,
};

use super::api_types::{StripeApiErrorEnvelope, StripeApiSubscription};
use crate::domain::billing::SubscriptionStatus;

/// Retry attempts for retryable provider failures.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts; doubles each retry.
const BACKOFF_BASE_MS: u64 = 200;

/// Stripe API client configuration.
#[derive(Clone)]
pub struct StripeClientConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for the Stripe API (overridable for tests).
    api_base_url: String,
}

impl StripeClientConfig {
    /// Create a new client configuration.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Stripe implementation of the `BillingProvider` port.
pub struct StripeBillingClient {
    config: StripeClientConfig,
    http_client: reqwest::Client,
}

impl StripeBillingClient {
    /// Create a new client with the given configuration.
    pub fn new(config: StripeClientConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn subscription_url(&self, subscription_id: &str) -> String {
        format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base_url, subscription_id
        )
    }

    /// Translate a non-2xx Stripe response into a provider error.
    async fn error_from_response(
        response: reqwest::Response,
    ) -> BillingProviderError {
        let status = response.status();
        let envelope: Option<StripeApiErrorEnvelope> = response.json().await.ok();
        let (code, message) = envelope
            .map(|e| (e.error.code, e.error.message))
            .unwrap_or((None, None));

        let error_code = match (status, code.as_deref()) {
            (StatusCode::NOT_FOUND, _) | (_, Some("resource_missing")) => {
                BillingProviderErrorCode::NotFound
            }
            (StatusCode::UNAUTHORIZED, _) => BillingProviderErrorCode::Authentication,
            (StatusCode::TOO_MANY_REQUESTS, _) => BillingProviderErrorCode::RateLimited,
            _ => BillingProviderErrorCode::Provider,
        };

        let mut err = BillingProviderError::new(
            error_code,
            message.unwrap_or_else(|| format!("Stripe API returned {}", status)),
        );
        if let Some(code) = code {
            err = err.with_provider_code(code);
        }
        err
    }

    /// Run a request closure with bounded retry on retryable failures.
    async fn with_retry<F, Fut>(&self, mut call: F) -> Result<reqwest::Response, BillingProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Self::error_from_response(response).await);
                    }
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(BillingProviderError::network(e.to_string()));
                    }
                    tracing::debug!(error = %e, attempt, "Stripe request failed, retrying");
                }
            }

            let backoff = BACKOFF_BASE_MS * (1 << (attempt - 1));
            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
        }
    }

    fn to_provider_subscription(api: StripeApiSubscription) -> ProviderSubscription {
        let plan_id = api.plan_id().map(str::to_string);
        ProviderSubscription {
            id: api.id,
            customer_id: api.customer,
            status: SubscriptionStatus::parse(&api.status),
            current_period_start: api.current_period_start,
            current_period_end: api.current_period_end,
            cancel_at_period_end: api.cancel_at_period_end,
            plan_id,
        }
    }
}

#[async_trait]
impl BillingProvider for StripeBillingClient {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ProviderSubscription>, BillingProviderError> {
        let url = self.subscription_url(subscription_id);
        let response = self
            .with_retry(|| {
                self.http_client
                    .get(&url)
                    .bearer_auth(self.config.api_key.expose_secret())
                    .send()
            })
            .await?;

        if response.status().is_success() {
            let api: StripeApiSubscription = response
                .json()
                .await
                .map_err(|e| BillingProviderError::network(e.to_string()))?;
            return Ok(Some(Self::to_provider_subscription(api)));
        }

        let err = Self::error_from_response(response).await;
        if err.code == BillingProviderErrorCode::NotFound {
            return Ok(None);
        }
        Err(err)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, BillingProviderError> {
        let url = self.subscription_url(subscription_id);
        let response = self
            .with_retry(|| {
                // Immediate cancel is DELETE; end-of-period cancel flips
                // the flag via POST.
                if at_period_end {
                    self.http_client
                        .post(&url)
                        .bearer_auth(self.config.api_key.expose_secret())
                        .form(&[("cancel_at_period_end", "true")])
                        .send()
                } else {
                    self.http_client
                        .delete(&url)
                        .bearer_auth(self.config.api_key.expose_secret())
                        .send()
                }
            })
            .await?;

        if response.status().is_success() {
            let api: StripeApiSubscription = response
                .json()
                .await
                .map_err(|e| BillingProviderError::network(e.to_string()))?;
            return Ok(Self::to_provider_subscription(api));
        }

        let err = Self::error_from_response(response).await;
        // A cancel against a subscription Stripe no longer bills reports
        // the state we wanted; surface it as its own category so callers
        // can treat it as success.
        if err.code == BillingProviderErrorCode::NotFound
            || err
                .message
                .to_ascii_lowercase()
                .contains("canceled subscription")
        {
            return Err(BillingProviderError::new(
                BillingProviderErrorCode::AlreadyCanceled,
                err.message,
            ));
        }
        Err(err)
    }
}
