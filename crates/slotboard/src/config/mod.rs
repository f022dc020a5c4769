use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub booking: BookingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("APP_PORT", 3000u16)?;
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let booking = BookingConfig {
            default_block_minutes: parse_env("BOOKING_BLOCK_MINUTES", 60)?,
            session_ttl_secs: parse_env("BOOKING_SESSION_TTL_SECS", 300)?,
            delivery: DeliveryConfig {
                max_primary_attempts: parse_env("NOTIFY_MAX_PRIMARY_ATTEMPTS", 2)?,
                retry_backoff_secs: parse_env("NOTIFY_RETRY_BACKOFF_SECS", 30)?,
                confirm_grace_secs: parse_env("NOTIFY_CONFIRM_GRACE_SECS", 5)?,
                unconfirmed_ttl_secs: parse_env("NOTIFY_UNCONFIRMED_TTL_SECS", 1800)?,
                poll_interval_secs: parse_env("NOTIFY_POLL_INTERVAL_SECS", 30)?,
            },
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            booking,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Policy dials for the booking engine and its notification pipeline.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub default_block_minutes: u32,
    pub session_ttl_secs: u64,
    pub delivery: DeliveryConfig,
}

/// Knobs for the delivery worker's bounded retry-and-fallback policy.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub max_primary_attempts: u32,
    pub retry_backoff_secs: u64,
    pub confirm_grace_secs: u64,
    pub unconfirmed_ttl_secs: u64,
    pub poll_interval_secs: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { key: &'static str },
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a valid number")
            }
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
