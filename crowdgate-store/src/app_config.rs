use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub rules: ReservationRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

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

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationRules {
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_seconds: u64,
    #[serde(default = "default_booking_expiry")]
    pub booking_expiry_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_interval_seconds: u64,
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_seconds: u64,
    #[serde(default = "default_publish_retries")]
    pub bus_publish_retries: usize,
    #[serde(default = "default_dlq_after")]
    pub consumer_dlq_after: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_lock_ttl() -> u64 {
    600
}
fn default_booking_expiry() -> u64 {
    600
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_gateway_timeout() -> u64 {
    5
}
fn default_publish_retries() -> usize {
    5
}
fn default_dlq_after() -> usize {
    10
}
fn default_rate_limit() -> i64 {
    600
}

impl ReservationRules {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn booking_expiry(&self) -> Duration {
        Duration::from_secs(self.booking_expiry_seconds)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. CROWDGATE__SERVER__PORT=8080
            .add_source(config::Environment::with_prefix("CROWDGATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
