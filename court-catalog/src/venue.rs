use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use court_core::{CoreError, CoreResult};

/// Local clock and operating hours of the venue. Reservations are stored in UTC;
/// every "hour of day" rule (opening, peak, weekend) is evaluated in venue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Venue {
    pub utc_offset: FixedOffset,
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Venue {
    pub fn new(utc_offset_minutes: i32, open_hour: u32, close_hour: u32) -> CoreResult<Self> {
        let utc_offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            CoreError::Validation(format!("invalid UTC offset: {} minutes", utc_offset_minutes))
        })?;

        if open_hour >= close_hour || close_hour > 24 {
            return Err(CoreError::Validation(format!(
                "invalid operating hours {}..{}",
                open_hour, close_hour
            )));
        }

        Ok(Self { utc_offset, open_hour, close_hour })
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.utc_offset)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    /// UTC instant of `hour:00` local time on `date`. `hour` may be 24 (next midnight).
    pub fn at(&self, date: NaiveDate, hour: u32) -> DateTime<Utc> {
        let local: NaiveDateTime = date.and_time(NaiveTime::MIN) + Duration::hours(hour as i64);
        let utc = local - Duration::seconds(self.utc_offset.local_minus_utc() as i64);
        DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc)
    }

    /// `[local midnight, next local midnight)` of `date`, in UTC.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.at(date, 0), self.at(date, 24))
    }

    pub fn is_open_hour(&self, hour: u32) -> bool {
        self.open_hour <= hour && hour < self.close_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_local_hour_maps_to_utc() {
        let venue = Venue::new(300, 6, 23).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 12, 7).unwrap();

        let start = venue.at(date, 19);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 7, 14, 0, 0).unwrap());
        assert_eq!(venue.local(start).hour(), 19);
        assert_eq!(venue.local_date(start), date);

        let (from, to) = venue.day_bounds(date);
        assert_eq!(to - from, Duration::hours(24));
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 12, 6, 19, 0, 0).unwrap());
    }

    #[test]
    fn test_rejects_inverted_hours() {
        assert!(Venue::new(300, 23, 6).is_err());
        assert!(Venue::new(300, 6, 25).is_err());
    }
}
