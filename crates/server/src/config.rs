//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETPLACE_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; not needed when `MARKETPLACE_STORE=memory`)
//!
//! ## Optional
//! - `MARKETPLACE_STORE` - `postgres` or `memory` (default: postgres)
//! - `MARKETPLACE_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETPLACE_PORT` - Listen port (default: 8080)
//! - `MARKETPLACE_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `MARKETPLACE_CACHE_TTL_SECS` - Product cache TTL (default: 3600)
//! - `MARKETPLACE_CACHE_CAPACITY` - In-process cache capacity (default: 10000)
//! - `MARKETPLACE_CACHE_QUEUE_DEPTH` - Cache writer queue depth (default: 1024)
//! - `MARKETPLACE_REDIS_URL` - Use Redis for the product cache (`redis` feature)
//! - `MARKETPLACE_TX_TIMEOUT_SECS` - Order transaction timeout (default: 10)
//! - `MARKETPLACE_LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which store backs the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("expected `postgres` or `memory`, got `{s}`")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("expected `pretty` or `json`, got `{s}`")),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `PostgreSQL` database connection URL (contains password).
    /// `None` only for the in-memory store.
    pub url: Option<SecretString>,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
        }
    }
}

/// Product cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached product.
    pub ttl: Duration,
    /// Maximum entries held by the in-process cache.
    pub capacity: u64,
    /// Bound of the cache writer queue.
    pub queue_depth: usize,
    /// Redis URL; the in-process cache is used when unset.
    pub redis_url: Option<SecretString>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            capacity: 10_000,
            queue_depth: 1024,
            redis_url: None,
        }
    }
}

/// Order placement settings.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// Upper bound on one order transaction.
    pub transaction_timeout: Duration,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(10),
        }
    }
}

/// Marketplace server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub store: StoreKind,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub order: OrderConfig,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let store: StoreKind = parse_env_or_default("MARKETPLACE_STORE", StoreKind::Postgres)?;
        let url = match store {
            StoreKind::Postgres => Some(get_database_url("MARKETPLACE_DATABASE_URL")?),
            StoreKind::Memory => None,
        };
        let defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url,
            max_connections: parse_env_or_default(
                "MARKETPLACE_DB_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            min_connections: defaults.min_connections,
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            ttl: Duration::from_secs(parse_env_or_default(
                "MARKETPLACE_CACHE_TTL_SECS",
                cache_defaults.ttl.as_secs(),
            )?),
            capacity: parse_env_or_default("MARKETPLACE_CACHE_CAPACITY", cache_defaults.capacity)?,
            queue_depth: parse_env_or_default(
                "MARKETPLACE_CACHE_QUEUE_DEPTH",
                cache_defaults.queue_depth,
            )?,
            redis_url: get_optional_env("MARKETPLACE_REDIS_URL").map(SecretString::from),
        };

        let order = OrderConfig {
            transaction_timeout: Duration::from_secs(parse_env_or_default(
                "MARKETPLACE_TX_TIMEOUT_SECS",
                OrderConfig::default().transaction_timeout.as_secs(),
            )?),
        };
        if order.transaction_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "MARKETPLACE_TX_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            store,
            database,
            cache,
            order,
            host: parse_env_or_default("MARKETPLACE_HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: parse_env_or_default("MARKETPLACE_PORT", 8080)?,
            log_format: parse_env_or_default("MARKETPLACE_LOG_FORMAT", LogFormat::Pretty)?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("memory".parse::<StoreKind>(), Ok(StoreKind::Memory));
        assert_eq!("Postgres".parse::<StoreKind>(), Ok(StoreKind::Postgres));
        assert!("sqlite".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<u16>("MARKETPLACE_PORT", "eighty").unwrap_err();
        match err {
            ConfigError::InvalidEnvVar(key, _) => assert_eq!(key, "MARKETPLACE_PORT"),
            ConfigError::MissingEnvVar(_) => panic!("wrong error"),
        }
        assert_eq!(parse_value::<u64>("X", " 30 ").unwrap(), 30);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CacheConfig::default().ttl, Duration::from_secs(3600));
        assert_eq!(CacheConfig::default().queue_depth, 1024);
        assert_eq!(DatabaseConfig::default().max_connections, 10);
        assert_eq!(
            OrderConfig::default().transaction_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            store: StoreKind::Memory,
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            order: OrderConfig::default(),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            log_format: LogFormat::Pretty,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
    }
}
