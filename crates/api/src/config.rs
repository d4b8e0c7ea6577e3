//! Application configuration loaded from environment variables.

use std::str::FromStr;

use checkout::{CheckoutConfig, IdempotencyKeyStrategy};
use orders::TransitionPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` PostgreSQL URL; in-memory ledgers when unset
/// - `RESERVATION_TTL_MINUTES` hold window for reserved stock (default: `15`)
/// - `PACKAGE_WEIGHT_GRAMS` weight sent to the shipping quoter (default: `1000`)
/// - `IDEMPOTENCY_KEY_STRATEGY` `per_attempt`, `cart_contents` or `legacy`
///   (default: `per_attempt`)
/// - `RESTOCK_ON_CANCEL` return reserved stock on cancel (default: `true`)
/// - `STRICT_TRANSITIONS` enforce the status transition table (default: `false`)
/// - `REAPER_INTERVAL_SECS` reservation sweep period (default: `60`)
/// - `NOTIFICATION_QUEUE_CAPACITY` pending confirmations (default: `1024`)
/// - `PAYMENT_APPROVAL_LIMIT_CENTS` the demo gateway declines charges at or
///   above this amount (default: `100000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub reaper_interval_secs: u64,
    pub notification_queue_capacity: usize,
    pub payment_approval_limit_cents: i64,
    pub checkout: CheckoutConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let checkout = CheckoutConfig {
            reservation_ttl_minutes: parse_or(
                parsed("RESERVATION_TTL_MINUTES"),
                defaults.checkout.reservation_ttl_minutes,
            ),
            package_weight_grams: parse_or(
                parsed("PACKAGE_WEIGHT_GRAMS"),
                defaults.checkout.package_weight_grams,
            ),
            idempotency: parse_or::<IdempotencyKeyStrategy>(
                parsed("IDEMPOTENCY_KEY_STRATEGY"),
                defaults.checkout.idempotency,
            ),
            restock_on_cancel: parsed("RESTOCK_ON_CANCEL")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.checkout.restock_on_cancel),
            transition_policy: match parsed("STRICT_TRANSITIONS").and_then(|v| parse_bool(&v)) {
                Some(true) => TransitionPolicy::Strict,
                Some(false) => TransitionPolicy::Lenient,
                None => defaults.checkout.transition_policy,
            },
            origin: None,
        };

        Self {
            host: parsed("HOST").unwrap_or(defaults.host),
            port: parse_or(parsed("PORT"), defaults.port),
            log_level: parsed("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or(parsed("LOG_FORMAT"), defaults.log_format),
            database_url: parsed("DATABASE_URL"),
            reaper_interval_secs: parse_or(
                parsed("REAPER_INTERVAL_SECS"),
                defaults.reaper_interval_secs,
            )
            .max(1),
            notification_queue_capacity: parse_or(
                parsed("NOTIFICATION_QUEUE_CAPACITY"),
                defaults.notification_queue_capacity,
            )
            .max(1),
            payment_approval_limit_cents: parse_or(
                parsed("PAYMENT_APPROVAL_LIMIT_CENTS"),
                defaults.payment_approval_limit_cents,
            ),
            checkout,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            database_url: None,
            reaper_interval_secs: 60,
            notification_queue_capacity: 1024,
            payment_approval_limit_cents: 100_000,
            checkout: CheckoutConfig::default(),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
