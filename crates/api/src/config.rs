//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `WEBHOOK_SECRET` — shared HMAC secret for payment webhooks
///   (default: `"whsec_dev"`, for local runs only)
/// - `COMMISSION_BPS` — platform commission in basis points (default: `2000`)
/// - `SLOT_CAPACITY` — bookings per slot (default: `3`)
/// - `EXPIRY_MINUTES` — abandoned-checkout window (default: `30`)
/// - `SWEEP_INTERVAL_SECS` — how often the expiry sweep runs (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub webhook_secret: String,
    pub commission_bps: u32,
    pub slot_capacity: u32,
    pub expiry_minutes: i64,
    pub sweep_interval_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "whsec_dev".to_string()),
            commission_bps: env_parse("COMMISSION_BPS", 2000),
            slot_capacity: env_parse("SLOT_CAPACITY", 3),
            expiry_minutes: env_parse("EXPIRY_MINUTES", 30),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60),
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
            webhook_secret: "whsec_dev".to_string(),
            commission_bps: 2000,
            slot_capacity: 3,
            expiry_minutes: 30,
            sweep_interval_secs: 60,
        }
    }
}
