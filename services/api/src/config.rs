//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Ten years.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Where profiles, quiz results and auth sessions live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataBackend {
    Postgres { database_url: String },
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub backend: DataBackend,
    pub log_level: Level,
    pub session_ttl: chrono::Duration,
    pub default_total_points: i32,
    pub allowed_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_vars(std::env::vars().collect())
    }

    /// Builds the configuration from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let var = |name: &str| vars.get(name).cloned();

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let allowed_origin =
            var("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Data Backend ---
        let backend = match var("DATA_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => DataBackend::Postgres {
                database_url: var("DATABASE_URL")
                    .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
            },
            "memory" => DataBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "DATA_BACKEND".to_string(),
                    format!("'{}' is neither 'postgres' nor 'memory'", other),
                ))
            }
        };

        // --- Session and Quiz Settings ---
        let session_ttl_hours = parse_or("SESSION_TTL_HOURS", var("SESSION_TTL_HOURS"), 24 * 30)?;
        let session_ttl = chrono::TimeDelta::try_hours(session_ttl_hours)
            .filter(|_| (1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SESSION_TTL_HOURS".to_string(),
                    format!("must be between 1 and {}", MAX_SESSION_TTL_HOURS),
                )
            })?;
        let default_total_points =
            parse_or("DEFAULT_TOTAL_POINTS", var("DEFAULT_TOTAL_POINTS"), 100)?;

        Ok(Self {
            bind_address,
            backend,
            log_level,
            session_ttl,
            default_total_points,
            allowed_origin,
        })
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_with_a_database_url() {
        let config = Config::from_vars(vars(&[("DATABASE_URL", "postgres://localhost/eduquest")])).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.default_total_points, 100);
        assert_eq!(config.session_ttl, chrono::Duration::days(30));
        assert_eq!(
            config.backend,
            DataBackend::Postgres {
                database_url: "postgres://localhost/eduquest".to_string()
            }
        );
    }

    #[test]
    fn postgres_requires_a_database_url() {
        assert!(matches!(
            Config::from_vars(HashMap::new()),
            Err(ConfigError::MissingVar(name)) if name == "DATABASE_URL"
        ));
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let config = Config::from_vars(vars(&[("DATA_BACKEND", "memory"), ("SESSION_TTL_HOURS", "2")])).unwrap();
        assert_eq!(config.backend, DataBackend::Memory);
        assert_eq!(config.session_ttl, chrono::Duration::hours(2));
    }

    #[test]
    fn rejects_bad_values() {
        for (name, value) in [
            ("DATA_BACKEND", "sqlite"),
            ("RUST_LOG", "chatty"),
            ("SESSION_TTL_HOURS", "0"),
            ("SESSION_TTL_HOURS", "9223372036854775807"),
            ("SESSION_TTL_HOURS", "2500000000"),
            ("DEFAULT_TOTAL_POINTS", "lots"),
            ("BIND_ADDRESS", "nowhere"),
        ] {
            let result = Config::from_vars(vars(&[("DATA_BACKEND", "memory"), (name, value)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(ref n, _)) if n == name),
                "{name}={value} should be rejected"
            );
        }
    }
}
