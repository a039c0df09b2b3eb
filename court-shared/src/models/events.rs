use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Lifecycle notifications published after a reservation transition commits.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    HoldPlaced {
        reservation_id: Uuid,
        court_id: Uuid,
        customer_id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        hold_expires_at: DateTime<Utc>,
        final_amount: Decimal,
    },
    ReservationConfirmed {
        reservation_id: Uuid,
        court_id: Uuid,
        customer_id: String,
        credential: String,
        timestamp: i64,
    },
    ReservationCancelled {
        reservation_id: Uuid,
        court_id: Uuid,
        reason: String,
        refund_amount: Option<Decimal>,
        timestamp: i64,
    },
    HoldExpired {
        reservation_id: Uuid,
        court_id: Uuid,
        start_time: DateTime<Utc>,
        timestamp: i64,
    },
    TicketRedeemed {
        reservation_id: Uuid,
        credential: String,
        redeemed_by: String,
        timestamp: i64,
    },
    ReservationSettled {
        reservation_id: Uuid,
        status: String,
        timestamp: i64,
    },
}

impl BookingEvent {
    pub fn reservation_id(&self) -> Uuid {
        match self {
            BookingEvent::HoldPlaced { reservation_id, .. }
            | BookingEvent::ReservationConfirmed { reservation_id, .. }
            | BookingEvent::ReservationCancelled { reservation_id, .. }
            | BookingEvent::HoldExpired { reservation_id, .. }
            | BookingEvent::TicketRedeemed { reservation_id, .. }
            | BookingEvent::ReservationSettled { reservation_id, .. } => *reservation_id,
        }
    }

    /// Short name used as a log field and message header.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingEvent::HoldPlaced { .. } => "hold_placed",
            BookingEvent::ReservationConfirmed { .. } => "reservation_confirmed",
            BookingEvent::ReservationCancelled { .. } => "reservation_cancelled",
            BookingEvent::HoldExpired { .. } => "hold_expired",
            BookingEvent::TicketRedeemed { .. } => "ticket_redeemed",
            BookingEvent::ReservationSettled { .. } => "reservation_settled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = BookingEvent::TicketRedeemed {
            reservation_id: Uuid::nil(),
            credential: "TNS-20241207-C0000-ABCDEFGHJK".to_string(),
            redeemed_by: "guard-1".to_string(),
            timestamp: 0,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "TICKET_REDEEMED");
        assert_eq!(event.kind(), "ticket_redeemed");
        assert_eq!(event.reservation_id(), Uuid::nil());
    }
}
