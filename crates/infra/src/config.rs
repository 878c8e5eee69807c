//! Configuration loading.
//!
//! Everything comes from environment variables with defaults suitable for a
//! local run. The binary seeds the environment from a `.env` file first (via
//! `dotenvy`), so real environment variables always win.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

/// Deployment environment; selects the log format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    /// Anything that is not `dev` (`prod`, `staging`, ...).
    Deployed(String),
}

impl Environment {
    pub fn is_dev(&self) -> bool {
        matches!(self, Environment::Dev)
    }
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub environment: Environment,
    /// `None` selects the in-memory backend.
    pub database: Option<DatabaseConfig>,
    /// How long a lock wait may last before it becomes a transient conflict.
    pub lock_timeout: Duration,
    /// Retries on transient conflict at the HTTP layer.
    pub order_retries: usize,
    pub jwt_secret: String,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("BOXOFFICE_ENV").as_deref() {
            None | Some("") | Some("dev") => Environment::Dev,
            Some(other) => Environment::Deployed(other.to_string()),
        };

        let database = match lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            }),
            None => None,
        };

        Ok(Self {
            bind_addr: lookup("BOXOFFICE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            environment,
            database,
            lock_timeout: Duration::from_millis(parse_or(&lookup, "BOXOFFICE_LOCK_TIMEOUT_MS", 5_000)?),
            order_retries: parse_or(&lookup, "BOXOFFICE_ORDER_RETRIES", 3)?,
            jwt_secret: lookup("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
        })
    }

    pub fn uses_default_jwt_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(self.order_retries)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_select_in_memory_dev_setup() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.environment.is_dev());
        assert_eq!(config.database, None);
        assert_eq!(config.lock_timeout, Duration::from_millis(5_000));
        assert_eq!(config.order_retries, 3);
        assert!(config.uses_default_jwt_secret());
    }

    #[test]
    fn database_url_selects_postgres() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/boxoffice"),
            ("DATABASE_MAX_CONNECTIONS", "32"),
            ("BOXOFFICE_ENV", "prod"),
            ("BOXOFFICE_LOCK_TIMEOUT_MS", "250"),
        ])
        .unwrap();

        assert_eq!(
            config.database,
            Some(DatabaseConfig {
                url: "postgres://localhost/boxoffice".to_string(),
                max_connections: 32,
            })
        );
        assert_eq!(config.environment, Environment::Deployed("prod".to_string()));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = load(&[("BOXOFFICE_ORDER_RETRIES", "lots")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "BOXOFFICE_ORDER_RETRIES".to_string(),
                value: "lots".to_string(),
            }
        );
    }
}
