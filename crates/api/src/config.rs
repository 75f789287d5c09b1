//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::Money;
use domain::EligibilityPolicy;
use saga::{FulfillmentSettings, ShippingPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `"0.0.0.0"`, `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL store when set, in-memory otherwise
/// - `PAYMENT_KEY_SECRET`: HMAC secret for payment signatures
/// - `CURRENCY`: gateway currency (default: `INR`)
/// - `EXTERNAL_TIMEOUT_MS`: bound on every external call (default: `5000`)
/// - `LOW_STOCK_THRESHOLD`: default low-stock threshold (default: `5`)
/// - `SHIPPING_FLAT_CHARGE`, `FREE_SHIPPING_THRESHOLD`: fallback shipping
///   policy in major units (default: `50`, `500`)
/// - `CARRIER_TOKEN_TTL_SECS`: carrier token lifetime (default: `86400`)
/// - `NEW_ONLY_BLOCKS_GUESTS`: reject new-customer codes for guests
///   (default: `false`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub payment_key_secret: String,
    pub currency: String,
    pub external_timeout_ms: u64,
    pub low_stock_threshold: i64,
    pub shipping_flat_charge: i64,
    pub free_shipping_threshold: i64,
    pub carrier_token_ttl_secs: i64,
    pub new_only_blocks_guests: bool,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT", defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL"),
            payment_key_secret: var("PAYMENT_KEY_SECRET").unwrap_or(defaults.payment_key_secret),
            currency: var("CURRENCY").unwrap_or(defaults.currency),
            external_timeout_ms: parsed("EXTERNAL_TIMEOUT_MS", defaults.external_timeout_ms),
            low_stock_threshold: parsed("LOW_STOCK_THRESHOLD", defaults.low_stock_threshold),
            shipping_flat_charge: parsed("SHIPPING_FLAT_CHARGE", defaults.shipping_flat_charge),
            free_shipping_threshold: parsed(
                "FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            ),
            carrier_token_ttl_secs: parsed(
                "CARRIER_TOKEN_TTL_SECS",
                defaults.carrier_token_ttl_secs,
            ),
            new_only_blocks_guests: parsed(
                "NEW_ONLY_BLOCKS_GUESTS",
                defaults.new_only_blocks_guests,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the carrier auth token lifetime.
    pub fn carrier_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.carrier_token_ttl_secs)
    }

    /// Builds the tunables shared by checkout and the order lifecycle.
    pub fn fulfillment_settings(&self) -> FulfillmentSettings {
        FulfillmentSettings {
            currency: self.currency.clone(),
            external_timeout: Duration::from_millis(self.external_timeout_ms),
            low_stock_threshold: self.low_stock_threshold,
            shipping: ShippingPolicy {
                flat_charge: Money::from_major(self.shipping_flat_charge),
                free_threshold: Money::from_major(self.free_shipping_threshold),
            },
            eligibility: EligibilityPolicy {
                new_only_blocks_guests: self.new_only_blocks_guests,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            payment_key_secret: "dev-secret".to_string(),
            currency: "INR".to_string(),
            external_timeout_ms: 5000,
            low_stock_threshold: 5,
            shipping_flat_charge: 50,
            free_shipping_threshold: 500,
            carrier_token_ttl_secs: 86_400,
            new_only_blocks_guests: false,
        }
    }
}
