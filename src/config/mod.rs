//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Round length used when ROUND_DURATION_SECS is not set
const DEFAULT_ROUND_DURATION: f32 = 120.0;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,

    /// Round length in seconds
    pub round_duration_secs: f32,
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

        let round_duration_secs = match env::var("ROUND_DURATION_SECS") {
            Ok(raw) => raw
                .parse::<f32>()
                .ok()
                .filter(|d| *d > 0.0)
                .ok_or(ConfigError::InvalidRoundDuration)?,
            Err(_) => DEFAULT_ROUND_DURATION,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN")
                .map_err(|_| ConfigError::Missing("CLIENT_ORIGIN"))?,

            round_duration_secs,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("ROUND_DURATION_SECS must be a positive number of seconds")]
    InvalidRoundDuration,
}
