//! Process configuration read from the environment.
//!
//! Values are read once at startup and never change afterwards.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DB_SOURCE` | `postgres://localhost:5432/ephemera` |
//! | `SERVER_ADDRESS` | `127.0.0.1:8080` |
//! | `TOKEN_SYMMETRIC_KEY` | unset |
//! | `ACCESS_TOKEN_DURATION` | `15m` (`<n>`, `<n>s`, `<n>m` or `<n>h`) |
//! | `SWEEP_INTERVAL_SECS` | `10` |

use std::net::SocketAddr;
use std::time::Duration;

use ephemera_core::{StoreConfig, DEFAULT_SWEEP_INTERVAL};
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/ephemera";
const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_ACCESS_TOKEN_DURATION: Duration = Duration::from_secs(15 * 60);

/// A configuration value could not be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid socket address: {value}")]
    InvalidAddress { name: &'static str, value: String },

    #[error("{name} is not a valid duration: {value}")]
    InvalidDuration { name: &'static str, value: String },

    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

/// Settings of the surrounding service
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Connection string of the durable user store
    pub database_url: String,
    pub server_address: SocketAddr,
    /// Key for signing access tokens, if token issuance is enabled
    pub token_symmetric_key: Option<String>,
    pub access_token_duration: Duration,
    pub sweep_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            server_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            token_symmetric_key: None,
            access_token_duration: DEFAULT_ACCESS_TOKEN_DURATION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ServiceConfig {
    /// Reads the configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DB_SOURCE").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        if database_url.is_empty() {
            return Err(ConfigError::Empty { name: "DB_SOURCE" });
        }

        let address = lookup("SERVER_ADDRESS").unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string());
        let server_address = address.parse().map_err(|_| ConfigError::InvalidAddress {
            name: "SERVER_ADDRESS",
            value: address.clone(),
        })?;

        let token_symmetric_key = lookup("TOKEN_SYMMETRIC_KEY").filter(|key| !key.is_empty());

        let access_token_duration = match lookup("ACCESS_TOKEN_DURATION") {
            Some(value) => parse_duration(&value).ok_or(ConfigError::InvalidDuration {
                name: "ACCESS_TOKEN_DURATION",
                value,
            })?,
            None => DEFAULT_ACCESS_TOKEN_DURATION,
        };

        let sweep_interval = match lookup("SWEEP_INTERVAL_SECS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidDuration {
                    name: "SWEEP_INTERVAL_SECS",
                    value,
                })?,
            None => DEFAULT_SWEEP_INTERVAL,
        };

        Ok(Self {
            database_url,
            server_address,
            token_symmetric_key,
            access_token_duration,
            sweep_interval,
        })
    }

    /// Configuration for the ephemeral store
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default().with_sweep_interval(self.sweep_interval)
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("database_url", &self.database_url)
            .field("server_address", &self.server_address)
            .field(
                "token_symmetric_key",
                &self.token_symmetric_key.as_ref().map(|_| "<redacted>"),
            )
            .field("access_token_duration", &self.access_token_duration)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

/// Parses `90`, `90s`, `15m` or `2h`
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };
    let amount: u64 = digits.parse().ok()?;
    let secs = match unit {
        "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(60 * 60)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
