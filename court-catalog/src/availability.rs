use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use court_core::models::{Court, MaintenanceWindow, Reservation};
use court_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

use crate::pricing::PeakWindow;
use crate::venue::Venue;

/// Slot granularity. Reservations always cover exactly one slot.
pub const SLOT_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_peak: bool,
}

impl Slot {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// Derives free slots of a court from operating hours and the intervals already taken.
///
/// Stateless: every call recomputes from the inputs it is given.
#[derive(Debug, Clone)]
pub struct AvailabilityCalculator {
    venue: Venue,
    peak: PeakWindow,
}

impl AvailabilityCalculator {
    pub fn new(venue: Venue, peak: PeakWindow) -> Self {
        Self { venue, peak }
    }

    pub fn venue(&self) -> &Venue {
        &self.venue
    }

    /// Every whole-hour slot between opening and closing on `date`, in order.
    pub fn candidate_slots(&self, date: NaiveDate) -> Vec<Slot> {
        (self.venue.open_hour..self.venue.close_hour)
            .step_by(SLOT_HOURS as usize)
            .map(|hour| {
                let start = self.venue.at(date, hour);
                Slot {
                    start,
                    end: start + Duration::hours(SLOT_HOURS),
                    is_peak: self.peak.contains(hour),
                }
            })
            .collect()
    }

    /// Slots on `date` still bookable at `now`.
    ///
    /// `reservations` must be the court's active reservations (HOLD/PAID/CONFIRMED);
    /// expired-but-unswept holds still block until the sweeper releases them.
    pub fn free_slots(
        &self,
        date: NaiveDate,
        court: &Court,
        reservations: &[Reservation],
        maintenance: &[MaintenanceWindow],
        now: DateTime<Utc>,
    ) -> Vec<Slot> {
        if !court.is_active {
            return Vec::new();
        }

        self.candidate_slots(date)
            .into_iter()
            .filter(|slot| slot.start > now)
            .filter(|slot| {
                !reservations
                    .iter()
                    .filter(|r| r.court_id == court.id && r.status.is_active())
                    .any(|r| r.overlaps(slot.start, slot.end))
            })
            .filter(|slot| {
                !maintenance
                    .iter()
                    .filter(|m| m.court_id == court.id)
                    .any(|m| m.overlaps(slot.start, slot.end))
            })
            .collect()
    }

    /// Validate a requested start instant and turn it into a slot.
    pub fn resolve_slot(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> CoreResult<Slot> {
        let local = self.venue.local(start);
        if local.minute() != 0 || local.second() != 0 || local.nanosecond() != 0 {
            return Err(CoreError::Validation(
                "slots start on a whole local hour".to_string(),
            ));
        }
        if !self.venue.is_open_hour(local.hour()) {
            return Err(CoreError::Validation(format!(
                "the venue is closed at {:02}:00",
                local.hour()
            )));
        }
        if start <= now {
            return Err(CoreError::Validation("slot start is in the past".to_string()));
        }

        Ok(Slot {
            start,
            end: start + Duration::hours(SLOT_HOURS),
            is_peak: self.peak.contains(local.hour()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use court_core::models::{PriceBreakdown, ReservationStatus};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn calculator() -> AvailabilityCalculator {
        AvailabilityCalculator::new(
            Venue::new(300, 6, 23).unwrap(),
            PeakWindow { start_hour: 18, end_hour: 22 },
        )
    }

    fn court() -> Court {
        Court::new("Court 1", Decimal::from(50000), Decimal::from(30000))
    }

    fn pricing() -> PriceBreakdown {
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

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 7).unwrap()
    }

    fn long_before() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_candidate_slots_cover_operating_hours() {
        let calc = calculator();
        let slots = calc.candidate_slots(date());

        assert_eq!(slots.len(), 17);
        assert_eq!(calc.venue().local(slots[0].start).hour(), 6);
        assert_eq!(calc.venue().local(slots[16].start).hour(), 22);
        assert!(slots.windows(2).all(|w| w[0].end == w[1].start));
        assert_eq!(slots.iter().filter(|s| s.is_peak).count(), 4);
    }

    #[test]
    fn test_active_reservations_block_slots() {
        let calc = calculator();
        let court = court();
        let start = calc.venue().at(date(), 19);

        let held = Reservation::hold(
            court.id,
            "c-1".to_string(),
            start,
            start + Duration::hours(1),
            pricing(),
            None,
            long_before(),
            Duration::minutes(5),
        );
        let mut cancelled = held.clone();
        cancelled.start_time = calc.venue().at(date(), 8);
        cancelled.end_time = cancelled.start_time + Duration::hours(1);
        cancelled.status = ReservationStatus::Cancelled;

        let free = calc.free_slots(date(), &court, &[held.clone(), cancelled], &[], long_before());

        assert_eq!(free.len(), 16);
        for slot in &free {
            assert!(!held.overlaps(slot.start, slot.end));
        }
        assert!(free.iter().any(|s| s.start == calc.venue().at(date(), 8)));
    }

    #[test]
    fn test_maintenance_blocks_slots() {
        let calc = calculator();
        let court = court();
        let window = MaintenanceWindow {
            id: Uuid::new_v4(),
            court_id: court.id,
            title: "Resurfacing".to_string(),
            start_time: calc.venue().at(date(), 10),
            end_time: calc.venue().at(date(), 12) + Duration::minutes(30),
        };

        let free = calc.free_slots(date(), &court, &[], &[window], long_before());
        // 10:00, 11:00 and 12:00 are touched
        assert_eq!(free.len(), 14);
    }

    #[test]
    fn test_past_slots_and_inactive_courts() {
        let calc = calculator();
        let mut court = court();
        let now = calc.venue().at(date(), 20) + Duration::minutes(10);

        let free = calc.free_slots(date(), &court, &[], &[], now);
        assert_eq!(free.len(), 2);

        court.is_active = false;
        assert!(calc.free_slots(date(), &court, &[], &[], long_before()).is_empty());
    }

    #[test]
    fn test_resolve_slot_validation() {
        let calc = calculator();
        let now = long_before();

        let slot = calc.resolve_slot(calc.venue().at(date(), 19), now).unwrap();
        assert!(slot.is_peak);
        assert_eq!(slot.end - slot.start, Duration::hours(1));

        let off_hour = calc.venue().at(date(), 19) + Duration::minutes(30);
        assert!(calc.resolve_slot(off_hour, now).is_err());
        assert!(calc.resolve_slot(calc.venue().at(date(), 23), now).is_err());
        assert!(calc.resolve_slot(calc.venue().at(date(), 5), now).is_err());

        let later = calc.venue().at(date(), 20);
        assert!(calc.resolve_slot(calc.venue().at(date(), 19), later).is_err());
    }
}
