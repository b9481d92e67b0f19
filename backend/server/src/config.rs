use std::{
    env,
    fmt::Display,
    fs::read_to_string,
    path::Path,
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use tracing::{info, warn};

use crate::password::DEFAULT_COST;

pub const SECRETS_DIR: &str = "/run/secrets";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Secret {0} is not configured")]
    MissingSecret(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    MySql,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(StoreBackend::MySql),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    pub frontend_url: String,
    pub store_backend: StoreBackend,
    pub database: DatabaseConfig,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub bcrypt_cost: u32,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(SECRETS_DIR, |key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Secrets are read from
    /// `<secrets_dir>/<NAME>` first and fall back to the lookup.
    pub fn from_lookup<F>(secrets_dir: impl AsRef<Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secrets_dir = secrets_dir.as_ref();

        let jwt_secret = read_secret(secrets_dir, &lookup, "JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ConfigError::MissingSecret("JWT_SECRET".to_string()))?;

        let jwt_expires_in: String = try_load(&lookup, "JWT_EXPIRES_IN", "24h")?;
        let jwt_expires_in = parse_duration(&jwt_expires_in).map_err(|reason| {
            ConfigError::Invalid {
                key: "JWT_EXPIRES_IN".to_string(),
                reason,
            }
        })?;

        let bcrypt_cost: u32 = try_load(&lookup, "BCRYPT_COST", &DEFAULT_COST.to_string())?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST".to_string(),
                reason: format!("{bcrypt_cost} is outside 4..=31"),
            });
        }

        let pool_size: u32 = try_load(&lookup, "DB_POOL_SIZE", "10")?;
        if pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_SIZE".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }

        let acquire_timeout_secs: u64 = try_load(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", "30")?;

        Ok(Self {
            port: try_load(&lookup, "RUST_PORT", "3001")?,
            environment: try_load(&lookup, "APP_ENV", "production")?,
            frontend_url: try_load(&lookup, "FRONTEND_URL", "http://localhost:3000")?,
            store_backend: try_load(&lookup, "STORE_BACKEND", "mysql")?,
            database: DatabaseConfig {
                host: try_load(&lookup, "DB_HOST", "localhost")?,
                port: try_load(&lookup, "DB_PORT", "3306")?,
                user: try_load(&lookup, "DB_USER", "root")?,
                password: read_secret(secrets_dir, &lookup, "DB_PASSWORD").unwrap_or_default(),
                name: try_load(&lookup, "DB_NAME", "polsim")?,
                pool_size,
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            },
            jwt_secret,
            jwt_expires_in,
            bcrypt_cost,
            max_body_bytes: try_load(&lookup, "MAX_BODY_BYTES", "1048576")?,
        })
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

fn read_secret<F>(secrets_dir: &Path, lookup: &F, secret_name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let path = secrets_dir.join(secret_name);

    match read_to_string(&path) {
        Ok(secret) => Some(secret.trim().to_string()),
        Err(_) => {
            info!(
                "{} not readable, falling back to environment for {secret_name}",
                path.display()
            );
            lookup(secret_name).map(|s| s.trim().to_string())
        }
    }
}

/// Parses a humantime duration (`24h`, `30min`, `2 days`, `1h 30m`). A bare
/// number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();

    let duration = match input.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(input).map_err(|e| format!("{input:?}: {e}"))?,
    };

    if duration.is_zero() {
        return Err("duration must be positive".to_string());
    }

    Ok(duration)
}
