//! Reviewdeck service entrypoint.
//!
//! Wires configuration, stores, the reconciliation engine, and the
//! webhook ingress, then serves until interrupted. The reconciliation
//! sweep runs on its own interval task.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use reviewdeck::adapters::http::{api_router, webhooks::WebhookAppState};
use reviewdeck::adapters::postgres::{PostgresProcessedEventStore, PostgresSubscriptionStore};
use reviewdeck::adapters::redis::RedisCorrelationStore;
use reviewdeck::adapters::stripe::{StripeBillingClient, StripeClientConfig};
use reviewdeck::application::{ReconcileWebhookHandler, ReconciliationSweep};
use reviewdeck::config::AppConfig;
use reviewdeck::domain::billing::{Reconciler, WebhookVerifier};
use reviewdeck::ports::{BillingProvider, CorrelationStore, ProcessedEventStore, SubscriptionStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .json()
        .init();

    tracing::info!(
        environment = ?config.server.environment,
        "starting reviewdeck"
    );

    // Database
    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    // Redis (correlation buffer)
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_tokio_connection().await?;

    // Stores and provider
    let subscriptions: Arc<dyn SubscriptionStore> =
        Arc::new(PostgresSubscriptionStore::new(pool.clone()));
    let events: Arc<dyn ProcessedEventStore> =
        Arc::new(PostgresProcessedEventStore::new(pool.clone()));
    let correlations: Arc<dyn CorrelationStore> =
        Arc::new(RedisCorrelationStore::new(redis_conn));
    let provider: Arc<dyn BillingProvider> = Arc::new(StripeBillingClient::new(
        StripeClientConfig::new(config.payment.stripe_api_key.clone()),
    ));

    // Engine
    let reconciler = Arc::new(Reconciler::new(
        subscriptions.clone(),
        events.clone(),
        correlations,
        provider.clone(),
        config.reconciliation.correlation_ttl(),
    ));

    let require_livemode = config.payment.require_livemode || config.is_production();
    let reconcile_handler = Arc::new(ReconcileWebhookHandler::new(
        WebhookVerifier::new(config.payment.stripe_webhook_secret.clone()),
        reconciler,
        require_livemode,
    ));

    // Background sweep
    let sweep = ReconciliationSweep::new(
        subscriptions,
        events,
        provider,
        config.reconciliation.event_retention_days,
    );
    let sweep_interval = config.reconciliation.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        // First tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep.run_once().await;
        }
    });

    // HTTP ingress
    let state = WebhookAppState { reconcile_handler };
    let app = api_router(
        state,
        std::time::Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
