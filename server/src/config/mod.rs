use chrono::TimeDelta;
use std::env;
use std::str::FromStr;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_PENDING_ORDER_TTL_MINUTES: i64 = 60;
const DEFAULT_PENDING_ORDER_SWEEP_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the service on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub server: ServerConfig,
    pub payments: PaymentsConfig,
    pub orders: OrderPolicy,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL the payment processor redirects buyers back to.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentsConfig {
    /// When set, checkout creates hosted payment sessions with Stripe.
    pub stripe_secret_key: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderPolicy {
    /// Pending orders older than this are canceled. Zero disables expiry.
    pub pending_ttl_minutes: i64,
    pub sweep_interval_seconds: u64,
}

impl OrderPolicy {
    /// Age after which a pending order is swept. Values too large for a
    /// `TimeDelta` fall back to the default.
    pub fn pending_ttl(&self) -> TimeDelta {
        TimeDelta::try_minutes(self.pending_ttl_minutes).unwrap_or_else(|| {
            tracing::warn!(
                "Config: PENDING_ORDER_TTL_MINUTES={} is out of range, using default",
                self.pending_ttl_minutes
            );
            TimeDelta::minutes(DEFAULT_PENDING_ORDER_TTL_MINUTES)
        })
    }
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            pending_ttl_minutes: DEFAULT_PENDING_ORDER_TTL_MINUTES,
            sweep_interval_seconds: DEFAULT_PENDING_ORDER_SWEEP_SECONDS,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    match non_empty(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Config: invalid value for {}: '{}', using default", name, raw);
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = parsed_or("PORT", DEFAULT_PORT);

        Self {
            database: non_empty("DATABASE_URL").map(|url| DatabaseConfig {
                url,
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            }),
            server: ServerConfig {
                host: non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                public_base_url: non_empty("PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("http://localhost:{}", port)),
            },
            payments: PaymentsConfig {
                stripe_secret_key: non_empty("STRIPE_SECRET_KEY"),
                webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET"),
            },
            orders: OrderPolicy {
                pending_ttl_minutes: parsed_or(
                    "PENDING_ORDER_TTL_MINUTES",
                    DEFAULT_PENDING_ORDER_TTL_MINUTES,
                ),
                sweep_interval_seconds: parsed_or(
                    "PENDING_ORDER_SWEEP_SECONDS",
                    DEFAULT_PENDING_ORDER_SWEEP_SECONDS,
                ),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_or_falls_back_on_garbage() {
        env::set_var("MARKETPLACE_TEST_PORT", "not-a-port");
        assert_eq!(parsed_or("MARKETPLACE_TEST_PORT", 8080u16), 8080);
        env::set_var("MARKETPLACE_TEST_PORT", "9090");
        assert_eq!(parsed_or("MARKETPLACE_TEST_PORT", 8080u16), 9090);
        env::remove_var("MARKETPLACE_TEST_PORT");
    }

    #[test]
    fn test_blank_values_are_unset() {
        env::set_var("MARKETPLACE_TEST_BLANK", "   ");
        assert!(non_empty("MARKETPLACE_TEST_BLANK").is_none());
        env::remove_var("MARKETPLACE_TEST_BLANK");
    }

    #[test]
    fn test_order_policy_defaults() {
        let policy = OrderPolicy::default();
        assert_eq!(policy.pending_ttl_minutes, 60);
        assert_eq!(policy.sweep_interval_seconds, 300);
        assert_eq!(policy.pending_ttl(), TimeDelta::minutes(60));
    }

    #[test]
    fn test_oversized_ttl_falls_back_to_default() {
        let policy = OrderPolicy {
            pending_ttl_minutes: i64::MAX,
            sweep_interval_seconds: 300,
        };
        assert_eq!(policy.pending_ttl(), TimeDelta::minutes(60));
    }
}
