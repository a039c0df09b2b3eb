use anyhow::{anyhow, Context};
use chrono::{Duration, Weekday};
use court_catalog::{PeakWindow, PricingConfig, Venue};
use court_order::{BookingPolicy, RetryPolicy};
use court_store::app_config::{BusinessRules, PaymentPollConfig, VenueConfig};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Domain settings derived from the loaded configuration and `settings` overrides.
#[derive(Debug, Clone)]
pub struct DomainSettings {
    pub venue: Venue,
    pub pricing: PricingConfig,
    pub policy: BookingPolicy,
    pub retry: RetryPolicy,
    pub manual_payment_mode: bool,
}

impl DomainSettings {
    pub fn from_config(
        venue: &VenueConfig,
        rules: &BusinessRules,
        payments: &PaymentPollConfig,
    ) -> anyhow::Result<Self> {
        let venue = Venue::new(venue.utc_offset_minutes, venue.open_hour, venue.close_hour)
            .context("venue configuration")?;
        let policy = booking_policy(rules)?;
        policy.validate().context("business_rules")?;

        Ok(Self {
            venue,
            pricing: pricing_config(rules)?,
            policy,
            retry: retry_policy(payments),
            manual_payment_mode: rules.manual_payment_mode,
        })
    }
}

pub fn pricing_config(rules: &BusinessRules) -> anyhow::Result<PricingConfig> {
    if rules.peak_start_hour >= rules.peak_end_hour || rules.peak_end_hour > 24 {
        return Err(anyhow!(
            "invalid peak window {}..{}",
            rules.peak_start_hour,
            rules.peak_end_hour
        ));
    }

    let weekend_days = rules
        .weekend_days
        .iter()
        .map(|d| parse_weekday(d))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(PricingConfig {
        peak: PeakWindow {
            start_hour: rules.peak_start_hour,
            end_hour: rules.peak_end_hour,
        },
        weekend_days,
        weekend_coefficient: decimal("weekend_coefficient", rules.weekend_coefficient)?,
        vip_discount_rate: decimal("vip_discount", rules.vip_discount)?,
        service_fee_rate: decimal("service_fee", rules.service_fee)?,
    })
}

pub fn booking_policy(rules: &BusinessRules) -> anyhow::Result<BookingPolicy> {
    Ok(BookingPolicy {
        hold_ttl: Duration::minutes(rules.booking_hold_minutes),
        cancellation_notice: Duration::hours(rules.cancellation_hours),
        late_cancellation_refund: decimal(
            "late_cancellation_refund",
            rules.late_cancellation_refund,
        )?,
        checkin_lead: Duration::minutes(rules.checkin_lead_minutes),
        checkin_grace: Duration::minutes(rules.checkin_grace_minutes),
    })
}

pub fn retry_policy(payments: &PaymentPollConfig) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(payments.max_poll_attempts)
        .initial_delay(std::time::Duration::from_millis(payments.initial_poll_delay_ms))
        .max_delay(std::time::Duration::from_millis(payments.max_poll_delay_ms))
        .multiplier(payments.poll_multiplier)
        .build()
}

fn parse_weekday(name: &str) -> anyhow::Result<Weekday> {
    Weekday::from_str(name.trim()).map_err(|_| anyhow!("unknown weekday '{}'", name))
}

// Through the shortest decimal text so 1.2 stays 1.2 rather than its binary expansion.
fn decimal(key: &str, value: f64) -> anyhow::Result<Decimal> {
    if !value.is_finite() {
        return Err(anyhow!("{} must be a finite number", key));
    }
    Decimal::from_str(&format!("{}", value)).with_context(|| format!("{} = {}", key, value))
}
