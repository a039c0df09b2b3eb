use anyhow::Context;
use court_api::{
    app,
    settings::DomainSettings,
    state::{AppState, AuthConfig},
    worker,
};
use court_core::models::PaymentMethod;
use court_core::payment::PaymentGateway;
use court_core::{BookingStore, EventSink, TracingEventSink};
use court_order::MockPaymentGateway;
use court_store::{Config, DbClient, EventProducer, PgBookingStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "court_api=debug,court_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Courtside API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let rules = match db.fetch_business_rules(config.business_rules.clone()).await {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!("Could not read settings table, using file configuration: {}", e);
            config.business_rules.clone()
        }
    };
    let settings = DomainSettings::from_config(&config.venue, &rules, &config.payments)?;

    let store: Arc<dyn BookingStore> =
        Arc::new(PgBookingStore::new(db.pool.clone(), settings.venue.utc_offset));

    // Kafka
    let events: Arc<dyn EventSink> = match EventProducer::new(&config.kafka.brokers) {
        Ok(producer) => Arc::new(producer),
        Err(e) => {
            tracing::warn!("Kafka unavailable, logging booking events instead: {}", e);
            Arc::new(TracingEventSink)
        }
    };

    let mut gateways: Vec<Arc<dyn PaymentGateway>> = Vec::new();
    if config.payments.sandbox_gateways {
        tracing::warn!("Sandbox payment gateways enabled; no real provider is contacted");
        for method in [PaymentMethod::Payme, PaymentMethod::Click, PaymentMethod::Uzum] {
            gateways.push(Arc::new(MockPaymentGateway::new(method)));
        }
    }

    let mut state = AppState::build(
        store,
        &settings,
        events,
        gateways,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    )?;

    // Redis
    match RedisClient::new(&config.redis.url).await {
        Ok(redis) => {
            state = state.with_rate_limit(Arc::new(redis), config.server.rate_limit_per_minute)
        }
        Err(e) => tracing::warn!("Redis unavailable, rate limiting disabled: {}", e),
    }

    worker::start_expiry_sweeper(
        state.clone(),
        Duration::from_secs(config.workers.sweep_interval_seconds),
    );
    worker::start_settlement_sweeper(
        state.clone(),
        Duration::from_secs(config.workers.settle_interval_seconds),
    );
    worker::resume_payment_pollers(&state).await?;

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
