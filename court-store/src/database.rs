use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of the `settings` table onto the file/env configuration.
    /// Values are stored as `{"value": ...}`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            match value.get("value") {
                Some(v) => apply_setting(&mut rules, &key, v),
                None => warn!(%key, "Setting without a value field ignored"),
            }
        }
        Ok(rules)
    }
}

fn apply_setting(rules: &mut BusinessRules, key: &str, v: &Value) {
    let applied = match key {
        "peak_start_hour" => v.as_u64().map(|n| rules.peak_start_hour = n as u32),
        "peak_end_hour" => v.as_u64().map(|n| rules.peak_end_hour = n as u32),
        "weekend_coefficient" => v.as_f64().map(|f| rules.weekend_coefficient = f),
        "vip_discount" => v.as_f64().map(|f| rules.vip_discount = f),
        "service_fee" => v.as_f64().map(|f| rules.service_fee = f),
        "booking_hold_minutes" => v.as_i64().map(|n| rules.booking_hold_minutes = n),
        "cancellation_hours" => v.as_i64().map(|n| rules.cancellation_hours = n),
        "late_cancellation_refund" => v.as_f64().map(|f| rules.late_cancellation_refund = f),
        "checkin_lead_minutes" => v.as_i64().map(|n| rules.checkin_lead_minutes = n),
        "checkin_grace_minutes" => v.as_i64().map(|n| rules.checkin_grace_minutes = n),
        "manual_payment_mode" => v.as_bool().map(|b| rules.manual_payment_mode = b),
        "weekend_days" => v.as_array().map(|days| {
            rules.weekend_days = days
                .iter()
                .filter_map(|d| d.as_str().map(str::to_string))
                .collect()
        }),
        _ => {
            warn!(%key, "Unknown setting ignored");
            return;
        }
    };

    if applied.is_none() {
        warn!(%key, value = %v, "Setting has the wrong type, keeping configured value");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> BusinessRules {
        BusinessRules {
            peak_start_hour: 18,
            peak_end_hour: 22,
            weekend_days: vec!["saturday".into(), "sunday".into()],
            weekend_coefficient: 1.2,
            vip_discount: 0.15,
            service_fee: 0.03,
            booking_hold_minutes: 5,
            cancellation_hours: 6,
            late_cancellation_refund: 0.5,
            checkin_lead_minutes: 60,
            checkin_grace_minutes: 15,
            manual_payment_mode: false,
        }
    }

    #[test]
    fn test_settings_override_rules() {
        let mut r = rules();
        apply_setting(&mut r, "booking_hold_minutes", &json!(10));
        apply_setting(&mut r, "manual_payment_mode", &json!(true));
        apply_setting(&mut r, "weekend_days", &json!(["sunday"]));

        assert_eq!(r.booking_hold_minutes, 10);
        assert!(r.manual_payment_mode);
        assert_eq!(r.weekend_days, vec!["sunday".to_string()]);
    }

    #[test]
    fn test_bad_settings_are_ignored() {
        let mut r = rules();
        apply_setting(&mut r, "service_fee", &json!("three percent"));
        apply_setting(&mut r, "no_such_rule", &json!(1));
        assert_eq!(r, rules());
    }
}
