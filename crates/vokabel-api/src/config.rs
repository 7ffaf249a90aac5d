use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

const MIN_BODY_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    /// Shared bearer token; `None` leaves the sync routes open
    pub sync_token: Option<String>,
    pub max_body_bytes: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field(
                "sync_token",
                &self.sync_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "VOKABEL_API_BIND_ADDR", "127.0.0.1:8787");
        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "VOKABEL_SERVER_DB_PATH",
            "vokabel-server.db",
        ));
        let sync_token = optional_trimmed(&lookup, "VOKABEL_SYNC_TOKEN");

        let max_body_bytes = value_or_default(&lookup, "VOKABEL_MAX_BODY_BYTES", "10485760")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(format!(
                    "VOKABEL_MAX_BODY_BYTES must be an integer in [{MIN_BODY_BYTES}, {MAX_BODY_BYTES}]"
                ))
            })?;
        if !(MIN_BODY_BYTES..=MAX_BODY_BYTES).contains(&max_body_bytes) {
            return Err(ConfigError::Invalid(format!(
                "VOKABEL_MAX_BODY_BYTES must be in [{MIN_BODY_BYTES}, {MAX_BODY_BYTES}]"
            )));
        }

        Ok(Self {
            bind_addr,
            db_path,
            sync_token,
            max_body_bytes,
        })
    }

    /// Config for tests: open routes, default limits.
    #[cfg(test)]
    pub fn for_tests(sync_token: Option<&str>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: PathBuf::from(":memory:"),
            sync_token: sync_token.map(str::to_string),
            max_body_bytes: MIN_BODY_BYTES,
        }
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
