use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub venue: VenueConfig,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub payments: PaymentPollConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenueConfig {
    /// Venue clock offset from UTC. Tashkent is +300.
    pub utc_offset_minutes: i32,
    pub open_hour: u32,
    pub close_hour: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusinessRules {
    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
    /// Lower-case English weekday names, e.g. `["saturday", "sunday"]`.
    pub weekend_days: Vec<String>,
    pub weekend_coefficient: f64,
    pub vip_discount: f64,
    pub service_fee: f64,
    pub booking_hold_minutes: i64,
    pub cancellation_hours: i64,
    #[serde(default = "default_late_refund")]
    pub late_cancellation_refund: f64,
    #[serde(default = "default_checkin_lead")]
    pub checkin_lead_minutes: i64,
    #[serde(default = "default_checkin_grace")]
    pub checkin_grace_minutes: i64,
    #[serde(default)]
    pub manual_payment_mode: bool,
}

fn default_late_refund() -> f64 { 0.5 }
fn default_checkin_lead() -> i64 { 60 }
fn default_checkin_grace() -> i64 { 15 }

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub sweep_interval_seconds: u64,
    pub settle_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { sweep_interval_seconds: 30, settle_interval_seconds: 60 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentPollConfig {
    pub max_poll_attempts: usize,
    pub initial_poll_delay_ms: u64,
    pub max_poll_delay_ms: u64,
    pub poll_multiplier: f64,
    /// Register scriptable in-process gateways for local runs. No real provider is contacted.
    #[serde(default)]
    pub sandbox_gateways: bool,
}

impl Default for PaymentPollConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 20,
            initial_poll_delay_ms: 2000,
            max_poll_delay_ms: 60_000,
            poll_multiplier: 1.5,
            sandbox_gateways: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 120 }

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `COURTSIDE__BUSINESS_RULES__MANUAL_PAYMENT_MODE=true`
            .add_source(config::Environment::with_prefix("COURTSIDE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
