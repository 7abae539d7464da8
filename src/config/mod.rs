//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::game::r#match::{DEFAULT_MATCH_MINUTES, DEFAULT_TEAM_CAPACITY};
use crate::game::MatchRules;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Players per team until the first join of a room overrides it
    pub default_team_size: usize,
    /// Match length used when `start` carries no duration
    pub default_match_minutes: u32,

    /// Allowed client origins for CORS (comma-separated); open when unset
    pub client_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            default_team_size: parse_positive("DEFAULT_TEAM_SIZE", DEFAULT_TEAM_CAPACITY)?,
            default_match_minutes: parse_positive("DEFAULT_MATCH_MINUTES", DEFAULT_MATCH_MINUTES)?,

            client_origin: env::var("CLIENT_ORIGIN")
                .ok()
                .filter(|origin| !origin.trim().is_empty()),
        })
    }

    /// Rules every new room starts with
    pub fn match_rules(&self) -> MatchRules {
        MatchRules {
            team_capacity: self.default_team_size,
            duration_min: self.default_match_minutes,
        }
    }
}

fn parse_positive<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => Ok(value),
            _ => Err(ConfigError::Invalid(key)),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
