use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::signing::{Party, RetryPolicy, SigningConfig};

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
    pub signing: SigningConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let signing = load_signing_config()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            signing,
        })
    }
}

fn load_signing_config() -> Result<SigningConfig, ConfigError> {
    let defaults = SigningConfig::default();

    let routing_order = match env::var("LEASE_ROUTING_ORDER") {
        Ok(raw) => parse_routing_order(&raw)?,
        Err(_) => defaults.routing_order,
    };

    let signing_window_days =
        parse_env_number::<i64>("LEASE_SIGNING_WINDOW_DAYS", defaults.signing_window_days)?;
    if signing_window_days <= 0 {
        return Err(ConfigError::InvalidSigningWindow);
    }

    let max_attempts = parse_env_number::<u32>(
        "PROVIDER_RETRY_ATTEMPTS",
        defaults.provider_retry.max_attempts,
    )?;
    let base_delay_ms = parse_env_number::<u64>(
        "PROVIDER_RETRY_BASE_MS",
        defaults.provider_retry.base_delay_ms,
    )?;
    let max_delay_ms = parse_env_number::<u64>(
        "PROVIDER_RETRY_MAX_MS",
        defaults.provider_retry.max_delay_ms,
    )?;

    let auto_void_on_timeout = env::var("LEASE_AUTO_VOID_ON_TIMEOUT")
        .map(|raw| matches!(raw.trim(), "1" | "true" | "yes"))
        .unwrap_or(defaults.auto_void_on_timeout);

    let return_url = env::var("SIGNING_RETURN_URL").unwrap_or(defaults.return_url);

    Ok(SigningConfig {
        routing_order,
        signing_window_days,
        provider_retry: RetryPolicy {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        },
        auto_void_on_timeout,
        return_url,
    })
}

fn parse_routing_order(raw: &str) -> Result<Vec<Party>, ConfigError> {
    let mut order = Vec::new();
    for token in raw.split(',') {
        let party = match token.trim().to_ascii_lowercase().as_str() {
            "tenant" => Party::Tenant,
            "owner" => Party::Owner,
            other => {
                return Err(ConfigError::UnknownSigningParty {
                    value: other.to_string(),
                })
            }
        };
        if order.contains(&party) {
            return Err(ConfigError::DuplicateSigningParty { party });
        }
        order.push(party);
    }
    if order.len() != 2 {
        return Err(ConfigError::IncompleteRoutingOrder);
    }
    Ok(order)
}

fn parse_env_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidSigningWindow,
    UnknownSigningParty { value: String },
    DuplicateSigningParty { party: Party },
    IncompleteRoutingOrder,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
            ConfigError::InvalidSigningWindow => {
                write!(
                    f,
                    "LEASE_SIGNING_WINDOW_DAYS must be a positive number of days"
                )
            }
            ConfigError::UnknownSigningParty { value } => {
                write!(f, "LEASE_ROUTING_ORDER contains unknown party '{value}'")
            }
            ConfigError::DuplicateSigningParty { party } => {
                write!(
                    f,
                    "LEASE_ROUTING_ORDER lists {} more than once",
                    party.label()
                )
            }
            ConfigError::IncompleteRoutingOrder => {
                write!(f, "LEASE_ROUTING_ORDER must list both tenant and owner")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
