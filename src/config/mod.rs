//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CLIENT_ORIGIN: &str = "http://localhost:3000";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HS256 secret for HTTP route tokens
    pub jwt_secret: String,
    /// Allowed client origins for CORS, comma-separated
    pub client_origin: String,

    /// How long a disconnected session snapshot is kept
    pub session_ttl: Duration,
    pub tick_interval: Duration,
    pub pause_poll: Duration,

    /// Durable results endpoint; results stay in memory when unset
    pub results_api: Option<ResultsApiConfig>,
}

/// PostgREST endpoint holding game and tournament history
#[derive(Clone, Debug)]
pub struct ResultsApiConfig {
    pub url: String,
    /// Service role key, server only
    pub key: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let results_api = match (env::var("RESULTS_API_URL"), env::var("RESULTS_API_KEY")) {
            (Ok(url), Ok(key)) => Some(ResultsApiConfig { url, key }),
            (Ok(_), Err(_)) => return Err(ConfigError::Missing("RESULTS_API_KEY")),
            _ => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| DEFAULT_CLIENT_ORIGIN.to_string()),

            session_ttl: Duration::from_secs(parse_or("SESSION_TTL_SECS", 500)?),
            tick_interval: Duration::from_millis(parse_or("TICK_INTERVAL_MS", 6)?),
            pause_poll: Duration::from_millis(parse_or("PAUSE_POLL_MS", 100)?),

            results_api,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            jwt_secret: "test-secret".to_string(),
            client_origin: DEFAULT_CLIENT_ORIGIN.to_string(),
            session_ttl: Duration::from_secs(500),
            tick_interval: Duration::from_millis(1),
            pause_poll: Duration::from_millis(5),
            results_api: None,
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,
}
