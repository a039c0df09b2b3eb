use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

/// Booking counters exported at `/metrics`.
pub struct Metrics {
    registry: Registry,
    pub holds_created: IntCounter,
    pub slot_conflicts: IntCounter,
    pub holds_expired: IntCounter,
    pub tickets_redeemed: IntCounter,
    pub payments_confirmed: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let holds_created = IntCounter::new("holds_created_total", "Holds placed")?;
        let slot_conflicts =
            IntCounter::new("slot_conflicts_total", "Hold attempts rejected for an occupied slot")?;
        let holds_expired = IntCounter::new("holds_expired_total", "Holds released by the sweeper")?;
        let tickets_redeemed = IntCounter::new("tickets_redeemed_total", "Tickets consumed at check-in")?;
        let payments_confirmed =
            IntCounter::new("payments_confirmed_total", "Payments that confirmed a reservation")?;

        registry.register(Box::new(holds_created.clone()))?;
        registry.register(Box::new(slot_conflicts.clone()))?;
        registry.register(Box::new(holds_expired.clone()))?;
        registry.register(Box::new(tickets_redeemed.clone()))?;
        registry.register(Box::new(payments_confirmed.clone()))?;

        Ok(Self {
            registry,
            holds_created,
            slot_conflicts,
            holds_expired,
            tickets_redeemed,
            payments_confirmed,
        })
    }

    /// Prometheus text exposition of every registered counter.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.export().map_err(anyhow::Error::from)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_lists_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.holds_created.inc();
        metrics.holds_created.inc();

        let text = metrics.export().unwrap();
        assert!(text.contains("holds_created_total 2"));
        assert!(text.contains("tickets_redeemed_total 0"));
    }
}
