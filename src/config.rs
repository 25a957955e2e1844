use std::{env, net::SocketAddr, time::Duration};

use dotenvy::dotenv;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SESSION_IDLE_MINUTES: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub admin_username: String,
    pub admin_password: String,
    /// Sessions untouched for this long are dropped.
    pub session_idle: Duration,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_raw = lookup("CLINIC_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "CLINIC_BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let max_connections = match lookup("CLINIC_DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "CLINIC_DB_MAX_CONNECTIONS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let session_idle_minutes = match lookup("CLINIC_SESSION_IDLE_MINUTES") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "CLINIC_SESSION_IDLE_MINUTES",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_SESSION_IDLE_MINUTES,
        };

        Ok(Config {
            database_url,
            bind_addr,
            max_connections,
            admin_username: lookup("CLINIC_ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
            admin_password: lookup("CLINIC_ADMIN_PASSWORD").unwrap_or_else(|| "admin123".to_string()),
            session_idle: Duration::from_secs(session_idle_minutes * 60),
        })
    }
}
