use std::env;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_HOLD_DURATION_MINUTES: i64 = 15;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// How long a holding booking keeps its inventory before the sweeper may
    /// release it.
    pub hold_duration: chrono::Duration,
    /// How often the expiry sweeper runs. Actual release latency is bounded
    /// by this, not by `hold_expires_at` itself.
    pub sweep_interval: Duration,
    pub gateway_secret: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/boxoffice".to_string()),
            port: parse_or(env::var("PORT").ok(), DEFAULT_PORT),
            hold_duration: chrono::Duration::minutes(parse_or(
                env::var("HOLD_DURATION_MINUTES").ok(),
                DEFAULT_HOLD_DURATION_MINUTES,
            )),
            sweep_interval: Duration::from_secs(parse_or(
                env::var("SWEEP_INTERVAL_SECONDS").ok(),
                DEFAULT_SWEEP_INTERVAL_SECONDS,
            )),
            gateway_secret: env::var("PAYMENT_GATEWAY_SECRET")
                .unwrap_or_else(|_| "dev-gateway-secret".to_string()),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
