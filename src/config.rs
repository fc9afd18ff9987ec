// config.rs
use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite://bitebattle.db?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: &str = "5";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: try_load("DATABASE_URL", DEFAULT_DATABASE_URL)?,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        })
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_limit() {
        let n: u32 = parse_value("DATABASE_MAX_CONNECTIONS", " 8 ").unwrap();
        assert_eq!(n, 8);
    }

    #[test]
    fn rejects_garbage_connection_limit() {
        let err = parse_value::<u32>("DATABASE_MAX_CONNECTIONS", "lots").unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));
    }
}
