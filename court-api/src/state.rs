use court_catalog::{AvailabilityCalculator, PricingEngine};
use court_core::payment::PaymentGateway;
use court_core::{BookingStore, EventSink};
use court_order::{PaymentOrchestrator, ReservationManager};
use court_store::RedisClient;
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::settings::DomainSettings;
use crate::worker::PollerSet;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub manager: Arc<ReservationManager>,
    pub payments: Arc<PaymentOrchestrator>,
    /// Rate limiting is skipped when absent.
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit_per_minute: i64,
    pub metrics: Arc<Metrics>,
    pub pollers: Arc<PollerSet>,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire the booking core over `store` with the given gateways and event sink.
    pub fn build(
        store: Arc<dyn BookingStore>,
        settings: &DomainSettings,
        events: Arc<dyn EventSink>,
        gateways: Vec<Arc<dyn PaymentGateway>>,
        auth: AuthConfig,
    ) -> anyhow::Result<Self> {
        let manager = Arc::new(ReservationManager::new(
            store.clone(),
            PricingEngine::new(settings.pricing.clone()),
            AvailabilityCalculator::new(settings.venue, settings.pricing.peak),
            settings.policy.clone(),
            events,
        ));

        let payments = gateways.into_iter().fold(
            PaymentOrchestrator::new(
                store.clone(),
                manager.clone(),
                settings.retry.clone(),
                settings.manual_payment_mode,
            ),
            |orchestrator, gateway| orchestrator.with_gateway(gateway),
        );

        Ok(Self {
            store,
            manager,
            payments: Arc::new(payments),
            redis: None,
            rate_limit_per_minute: 0,
            metrics: Arc::new(Metrics::new()?),
            pollers: Arc::new(PollerSet::default()),
            auth,
        })
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, per_minute: i64) -> Self {
        self.redis = Some(redis);
        self.rate_limit_per_minute = per_minute;
        self
    }
}
