use chrono::{DateTime, Duration, Utc};
use court_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::access::Role;
use crate::CoreError;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::Validation(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

/// A bookable court. Courts are soft-deactivated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Court {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_indoor: bool,
    pub hourly_rate_peak: Decimal,
    pub hourly_rate_offpeak: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Court {
    pub fn new(name: impl Into<String>, hourly_rate_peak: Decimal, hourly_rate_offpeak: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            is_active: true,
            is_indoor: false,
            hourly_rate_peak,
            hourly_rate_offpeak,
            created_at: Utc::now(),
        }
    }

    /// Short human code printed in ticket credentials.
    pub fn short_code(&self) -> String {
        self.id.simple().to_string()[..4].to_uppercase()
    }
}

/// Administrative edit of a court. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourtUpdate {
    pub is_active: Option<bool>,
    pub hourly_rate_peak: Option<Decimal>,
    pub hourly_rate_offpeak: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub display_name: String,
    pub phone: Option<Masked<String>>,
    pub is_vip: bool,
    pub is_blocked: bool,
    pub role: Role,
}

impl Customer {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            phone: None,
            is_vip: false,
            is_blocked: false,
            role: Role::Customer,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Hold,
    Paid,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

string_enum!(ReservationStatus {
    Hold => "HOLD",
    Paid => "PAID",
    Confirmed => "CONFIRMED",
    Cancelled => "CANCELLED",
    Completed => "COMPLETED",
    NoShow => "NO_SHOW",
});

impl ReservationStatus {
    /// Statuses that occupy their interval on the court.
    pub const ACTIVE: [ReservationStatus; 3] = [
        ReservationStatus::Hold,
        ReservationStatus::Paid,
        ReservationStatus::Confirmed,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::Completed | ReservationStatus::NoShow
        )
    }
}

/// Line items produced by the pricing engine.
///
/// `peak_extra` is a display decomposition: it is already part of `base_price`
/// through peak-rate selection and is never added again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBreakdown {
    pub base_price: Decimal,
    pub peak_extra: Decimal,
    pub weekend_extra: Decimal,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub service_fee: Decimal,
    pub final_amount: Decimal,
    pub is_peak: bool,
    pub is_weekend: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub court_id: Uuid,
    pub customer_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
    pub pricing: PriceBreakdown,
    pub promo_code: Option<String>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// A fresh HOLD expiring `hold_ttl` after `now`.
    #[allow(clippy::too_many_arguments)]
    pub fn hold(
        court_id: Uuid,
        customer_id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        pricing: PriceBreakdown,
        promo_code: Option<String>,
        now: DateTime<Utc>,
        hold_ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            court_id,
            customer_id,
            start_time,
            end_time,
            status: ReservationStatus::Hold,
            pricing,
            promo_code,
            hold_expires_at: Some(now + hold_ttl),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Half-open interval overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    pub fn is_hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Hold
            && self.hold_expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Payme,
    Click,
    Uzum,
    Cash,
}

string_enum!(PaymentMethod {
    Payme => "payme",
    Click => "click",
    Uzum => "uzum",
    Cash => "cash",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Refunded,
}

string_enum!(PaymentStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Paid => "PAID",
    Failed => "FAILED",
    Refunded => "REFUNDED",
});

impl PaymentStatus {
    pub const OPEN: [PaymentStatus; 2] = [PaymentStatus::Pending, PaymentStatus::Processing];

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed | PaymentStatus::Refunded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub customer_id: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub external_ref: Option<String>,
    pub payment_url: Option<String>,
    pub refunded_amount: Option<Decimal>,
    pub error_message: Option<String>,
    pub poll_attempts: i32,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        reservation_id: Uuid,
        customer_id: String,
        method: PaymentMethod,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            customer_id,
            method,
            amount,
            status: PaymentStatus::Pending,
            external_ref: None,
            payment_url: None,
            refunded_amount: None,
            error_message: None,
            poll_attempts: 0,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field changes applied together with a conditional payment status update.
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub external_ref: Option<String>,
    pub payment_url: Option<String>,
    pub refunded_amount: Option<Decimal>,
    pub error_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Active,
    Used,
    Expired,
    Cancelled,
}

string_enum!(TicketStatus {
    Active => "ACTIVE",
    Used => "USED",
    Expired => "EXPIRED",
    Cancelled => "CANCELLED",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub credential: String,
    /// JSON document handed to the renderer (QR image / PDF).
    pub payload: String,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromoKind {
    Percentage,
    Fixed,
}

string_enum!(PromoKind {
    Percentage => "percentage",
    Fixed => "fixed",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    pub kind: PromoKind,
    /// Fraction of the subtotal for `Percentage` (0.10 = 10%), currency units for `Fixed`.
    pub value: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// A period during which a court cannot be booked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceWindow {
    pub id: Uuid,
    pub court_id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl MaintenanceWindow {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn breakdown() -> PriceBreakdown {
        PriceBreakdown {
            base_price: Decimal::from(30000),
            peak_extra: Decimal::ZERO,
            weekend_extra: Decimal::ZERO,
            subtotal: Decimal::from(30000),
            discount: Decimal::ZERO,
            service_fee: Decimal::from(900),
            final_amount: Decimal::from(30900),
            is_peak: false,
            is_weekend: false,
        }
    }

    #[test]
    fn test_half_open_overlap() {
        let start = Utc.with_ymd_and_hms(2024, 12, 7, 10, 0, 0).unwrap();
        let end = start + Duration::hours(1);
        let reservation = Reservation::hold(
            Uuid::new_v4(),
            "c-1".to_string(),
            start,
            end,
            breakdown(),
            None,
            start - Duration::days(1),
            Duration::minutes(5),
        );

        assert!(reservation.overlaps(start, end));
        assert!(reservation.overlaps(start + Duration::minutes(30), end + Duration::minutes(30)));
        // Touching intervals do not overlap
        assert!(!reservation.overlaps(end, end + Duration::hours(1)));
        assert!(!reservation.overlaps(start - Duration::hours(1), start));
    }

    #[test]
    fn test_status_round_trip_through_storage_text() {
        for status in [
            ReservationStatus::Hold,
            ReservationStatus::NoShow,
            ReservationStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
        assert!("BOOKED".parse::<ReservationStatus>().is_err());
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
    }

    #[test]
    fn test_hold_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 12, 7, 9, 0, 0).unwrap();
        let reservation = Reservation::hold(
            Uuid::new_v4(),
            "c-1".to_string(),
            now + Duration::hours(2),
            now + Duration::hours(3),
            breakdown(),
            None,
            now,
            Duration::minutes(5),
        );
        assert!(!reservation.is_hold_expired(now + Duration::minutes(4)));
        assert!(reservation.is_hold_expired(now + Duration::minutes(5)));
    }
}
