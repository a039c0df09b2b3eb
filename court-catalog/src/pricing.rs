use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use court_core::models::{PriceBreakdown, PromoCode};
use court_core::{CoreError, CoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::promo;

/// Local hours `[start_hour, end_hour)` billed at the peak rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl PeakWindow {
    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }
}

/// Rate constants of the venue. Loaded from configuration, never hardcoded at call sites.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub peak: PeakWindow,
    pub weekend_days: Vec<Weekday>,
    /// Multiplier applied to the base price on weekend days (1.2 = +20%).
    pub weekend_coefficient: Decimal,
    /// Fraction of the subtotal discounted for VIP customers.
    pub vip_discount_rate: Decimal,
    /// Fraction of the subtotal charged as service fee.
    pub service_fee_rate: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            peak: PeakWindow { start_hour: 18, end_hour: 22 },
            weekend_days: vec![Weekday::Sat, Weekday::Sun],
            weekend_coefficient: Decimal::new(12, 1),
            vip_discount_rate: Decimal::new(15, 2),
            service_fee_rate: Decimal::new(3, 2),
        }
    }
}

/// Input of a single price computation. `start` is in venue-local time.
#[derive(Debug, Clone)]
pub struct PriceRequest {
    pub peak_rate: Decimal,
    pub offpeak_rate: Decimal,
    pub duration_hours: Decimal,
    pub start: DateTime<FixedOffset>,
    pub is_vip: bool,
    /// Absolute promo discount in currency units.
    pub promo_discount: Decimal,
}

/// Deterministic court pricing. Same request, same breakdown; no I/O.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

const CURRENCY_SCALE: u32 = 2;

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn is_peak_hour(&self, hour: u32) -> bool {
        self.config.peak.contains(hour)
    }

    pub fn is_weekend(&self, weekday: Weekday) -> bool {
        self.config.weekend_days.contains(&weekday)
    }

    pub fn price(&self, request: &PriceRequest) -> CoreResult<PriceBreakdown> {
        if request.duration_hours <= Decimal::ZERO {
            return Err(CoreError::Validation("duration must be positive".to_string()));
        }
        if request.promo_discount < Decimal::ZERO {
            return Err(CoreError::Validation("promo discount cannot be negative".to_string()));
        }
        if request.peak_rate < Decimal::ZERO || request.offpeak_rate < Decimal::ZERO {
            return Err(CoreError::Validation("hourly rates cannot be negative".to_string()));
        }

        let is_peak = self.is_peak_hour(request.start.hour());
        let is_weekend = self.is_weekend(request.start.weekday());

        let base_rate = if is_peak { request.peak_rate } else { request.offpeak_rate };
        let base_price = base_rate * request.duration_hours;

        // Reporting line only: base_price already carries it through the peak rate.
        let peak_extra = if is_peak {
            (request.peak_rate - request.offpeak_rate) * request.duration_hours
        } else {
            Decimal::ZERO
        };

        let weekend_extra = if is_weekend {
            base_price * (self.config.weekend_coefficient - Decimal::ONE)
        } else {
            Decimal::ZERO
        };
        let subtotal = base_price + weekend_extra;

        let mut discount = request.promo_discount;
        if request.is_vip {
            discount += subtotal * self.config.vip_discount_rate;
        }

        let service_fee = subtotal * self.config.service_fee_rate;
        let final_amount = (subtotal - discount + service_fee).max(Decimal::ZERO);

        Ok(PriceBreakdown {
            base_price: money(base_price),
            peak_extra: money(peak_extra),
            weekend_extra: money(weekend_extra),
            subtotal: money(subtotal),
            discount: money(discount),
            service_fee: money(service_fee),
            final_amount: money(final_amount),
            is_peak,
            is_weekend,
        })
    }

    /// Price with a promo code resolved against the undiscounted subtotal.
    /// The code must already be validated for the booking time.
    pub fn price_with_promo(
        &self,
        request: &PriceRequest,
        promo: Option<&PromoCode>,
    ) -> CoreResult<PriceBreakdown> {
        let Some(promo) = promo else {
            return self.price(request);
        };

        let undiscounted = self.price(&PriceRequest {
            promo_discount: Decimal::ZERO,
            ..request.clone()
        })?;

        self.price(&PriceRequest {
            promo_discount: request.promo_discount
                + promo::discount_amount(promo, undiscounted.subtotal),
            ..request.clone()
        })
    }
}

/// Round to the currency scale, dropping trailing zeros so every amount serializes alike.
pub fn money(value: Decimal) -> Decimal {
    value.round_dp(CURRENCY_SCALE).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use court_core::models::PromoKind;
    use uuid::Uuid;

    fn tashkent(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
    }

    fn request(start: DateTime<FixedOffset>, is_vip: bool) -> PriceRequest {
        PriceRequest {
            peak_rate: Decimal::from(50000),
            offpeak_rate: Decimal::from(30000),
            duration_hours: Decimal::ONE,
            start,
            is_vip,
            promo_discount: Decimal::ZERO,
        }
    }

    #[test]
    fn test_saturday_evening_peak() {
        let engine = PricingEngine::new(PricingConfig::default());
        // 2024-12-07 is a Saturday
        let breakdown = engine.price(&request(tashkent(2024, 12, 7, 19), false)).unwrap();

        assert!(breakdown.is_peak);
        assert!(breakdown.is_weekend);
        assert_eq!(breakdown.base_price, Decimal::from(50000));
        assert_eq!(breakdown.peak_extra, Decimal::from(20000));
        assert_eq!(breakdown.weekend_extra, Decimal::from(10000));
        assert_eq!(breakdown.subtotal, Decimal::from(60000));
        assert_eq!(breakdown.discount, Decimal::ZERO);
        assert_eq!(breakdown.service_fee, Decimal::from(1800));
        assert_eq!(breakdown.final_amount, Decimal::from(61800));
    }

    #[test]
    fn test_weekday_morning_offpeak() {
        let engine = PricingEngine::new(PricingConfig::default());
        // 2024-12-04 is a Wednesday
        let breakdown = engine.price(&request(tashkent(2024, 12, 4, 9), false)).unwrap();

        assert!(!breakdown.is_peak);
        assert!(!breakdown.is_weekend);
        assert_eq!(breakdown.base_price, Decimal::from(30000));
        assert_eq!(breakdown.peak_extra, Decimal::ZERO);
        assert_eq!(breakdown.final_amount, Decimal::from(30900));
    }

    #[test]
    fn test_peak_window_end_is_exclusive() {
        let engine = PricingEngine::new(PricingConfig::default());
        assert!(engine.is_peak_hour(18));
        assert!(engine.is_peak_hour(21));
        assert!(!engine.is_peak_hour(22));
        assert!(!engine.is_peak_hour(17));
    }

    #[test]
    fn test_vip_and_promo_discounts_stack() {
        let engine = PricingEngine::new(PricingConfig::default());
        let mut req = request(tashkent(2024, 12, 7, 19), true);
        req.promo_discount = Decimal::from(5000);

        let breakdown = engine.price(&req).unwrap();
        // 15% of 60000 + 5000
        assert_eq!(breakdown.discount, Decimal::from(14000));
        assert_eq!(breakdown.final_amount, Decimal::from(47800));
    }

    #[test]
    fn test_final_amount_never_negative() {
        let engine = PricingEngine::new(PricingConfig::default());
        let mut req = request(tashkent(2024, 12, 4, 9), false);
        req.promo_discount = Decimal::from(1_000_000);

        let breakdown = engine.price(&req).unwrap();
        assert_eq!(breakdown.final_amount, Decimal::ZERO);
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let engine = PricingEngine::new(PricingConfig::default());
        let mut req = request(tashkent(2024, 12, 4, 9), false);
        req.duration_hours = Decimal::ZERO;
        assert!(matches!(engine.price(&req), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_pricing_is_deterministic() {
        let engine = PricingEngine::new(PricingConfig::default());
        let req = request(tashkent(2024, 12, 8, 20), true);
        assert_eq!(engine.price(&req).unwrap(), engine.price(&req).unwrap());
    }

    #[test]
    fn test_percentage_promo_uses_subtotal() {
        let engine = PricingEngine::new(PricingConfig::default());
        let now = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        let promo = PromoCode {
            id: Uuid::new_v4(),
            code: "WINTER10".to_string(),
            kind: PromoKind::Percentage,
            value: Decimal::new(10, 2),
            max_uses: None,
            used_count: 0,
            is_active: true,
            valid_from: now,
            valid_until: Some(now + Duration::days(30)),
        };

        let breakdown = engine
            .price_with_promo(&request(tashkent(2024, 12, 7, 19), false), Some(&promo))
            .unwrap();
        assert_eq!(breakdown.discount, Decimal::from(6000));
        assert_eq!(breakdown.final_amount, Decimal::from(55800));
    }
}
