use chrono::{DateTime, Duration, Utc};
use court_catalog::money;
use court_core::{CoreError, CoreResult};
use rust_decimal::Decimal;
use serde::Serialize;

/// Time and refund rules of the booking lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPolicy {
    pub hold_ttl: Duration,
    /// Cancelling with at least this much notice before start refunds in full.
    pub cancellation_notice: Duration,
    /// Fraction of the paid amount refunded on a late cancellation.
    pub late_cancellation_refund: Decimal,
    pub checkin_lead: Duration,
    pub checkin_grace: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::minutes(5),
            cancellation_notice: Duration::hours(6),
            late_cancellation_refund: Decimal::new(5, 1),
            checkin_lead: Duration::minutes(60),
            checkin_grace: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundKind {
    Full,
    Partial,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct RefundDecision {
    pub kind: RefundKind,
    pub amount: Decimal,
}

impl BookingPolicy {
    pub fn validate(&self) -> CoreResult<()> {
        if self.hold_ttl <= Duration::zero() {
            return Err(CoreError::Validation("hold TTL must be positive".to_string()));
        }
        if self.late_cancellation_refund < Decimal::ZERO
            || self.late_cancellation_refund > Decimal::ONE
        {
            return Err(CoreError::Validation(
                "late cancellation refund must be between 0 and 1".to_string(),
            ));
        }
        if self.checkin_lead < Duration::zero() || self.checkin_grace < Duration::zero() {
            return Err(CoreError::Validation("check-in window cannot be negative".to_string()));
        }
        Ok(())
    }

    /// Refund owed for `paid` when cancelling a reservation starting at `start`.
    pub fn refund_for(
        &self,
        paid: Decimal,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RefundDecision {
        if start - now >= self.cancellation_notice {
            RefundDecision { kind: RefundKind::Full, amount: money(paid) }
        } else {
            RefundDecision {
                kind: RefundKind::Partial,
                amount: money(paid * self.late_cancellation_refund),
            }
        }
    }

    /// `[start - lead, start + grace]`.
    pub fn checkin_window(&self, start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (start - self.checkin_lead, start + self.checkin_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_refund_branches_on_notice() {
        let policy = BookingPolicy::default();
        let start = Utc.with_ymd_and_hms(2024, 12, 7, 14, 0, 0).unwrap();
        let paid = Decimal::from(61800);

        let early = policy.refund_for(paid, start, start - Duration::hours(6));
        assert_eq!(early.kind, RefundKind::Full);
        assert_eq!(early.amount, paid);

        let late = policy.refund_for(paid, start, start - Duration::hours(2));
        assert_eq!(late.kind, RefundKind::Partial);
        assert_eq!(late.amount, Decimal::from(30900));
        assert_eq!(late.amount.to_string(), "30900");
    }

    #[test]
    fn test_partial_refund_keeps_cents() {
        let policy = BookingPolicy::default();
        let start = Utc.with_ymd_and_hms(2024, 12, 7, 14, 0, 0).unwrap();

        let late = policy.refund_for(Decimal::new(61801, 0), start, start - Duration::hours(1));
        assert_eq!(late.amount.to_string(), "30900.5");
    }

    #[test]
    fn test_rejects_out_of_range_refund_fraction() {
        let policy = BookingPolicy {
            late_cancellation_refund: Decimal::new(15, 1),
            ..BookingPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(BookingPolicy::default().validate().is_ok());
    }
}
