//! Device-side sync configuration.
//!
//! Read from the environment (or any lookup function, for tests). A missing
//! server URL is not an error: the device simply works offline.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

/// Path of the sync endpoint below the server base URL
pub const SYNC_PATH: &str = "/api/words/sync";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SYNC_DEBOUNCE_MS: u64 = 1200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server base URL, `None` to stay offline
    pub server_url: Option<String>,
    /// Bearer token for the sync endpoint
    pub sync_token: Option<String>,
    pub http_timeout: Duration,
    pub sync_debounce: Duration,
    /// Byte quota for the local store, unbounded when `None`
    pub storage_quota_bytes: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            sync_token: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            sync_debounce: Duration::from_millis(DEFAULT_SYNC_DEBOUNCE_MS),
            storage_quota_bytes: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("sync_token", &self.sync_token.as_ref().map(|_| "[REDACTED]"))
            .field("http_timeout", &self.http_timeout)
            .field("sync_debounce", &self.sync_debounce)
            .field("storage_quota_bytes", &self.storage_quota_bytes)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_url = normalize_text_option(lookup("VOKABEL_SERVER_URL"))
            .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = &server_url {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "VOKABEL_SERVER_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let http_timeout_secs = bounded(
            &lookup,
            "VOKABEL_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
            1..=120,
        )?;
        let sync_debounce_ms = bounded(
            &lookup,
            "VOKABEL_SYNC_DEBOUNCE_MS",
            DEFAULT_SYNC_DEBOUNCE_MS,
            100..=60_000,
        )?;

        let storage_quota_bytes = normalize_text_option(lookup("VOKABEL_STORAGE_QUOTA_BYTES"))
            .map(|value| {
                value.parse::<usize>().map_err(|_| {
                    ConfigError::Invalid(
                        "VOKABEL_STORAGE_QUOTA_BYTES must be a positive integer".to_string(),
                    )
                })
            })
            .transpose()?;

        Ok(Self {
            server_url,
            sync_token: normalize_text_option(lookup("VOKABEL_SYNC_TOKEN")),
            http_timeout: Duration::from_secs(http_timeout_secs),
            sync_debounce: Duration::from_millis(sync_debounce_ms),
            storage_quota_bytes,
        })
    }

    /// Full URL of the sync endpoint, if a server is configured
    pub fn sync_endpoint(&self) -> Option<String> {
        self.server_url.as_ref().map(|url| {
            if url.ends_with(SYNC_PATH) {
                url.clone()
            } else {
                format!("{url}{SYNC_PATH}")
            }
        })
    }
}

fn bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = normalize_text_option(lookup(name)) else {
        return Ok(default);
    };
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer between {} and {}",
            range.start(),
            range.end()
        ))
    };
    let value = raw.parse::<u64>().map_err(|_| invalid())?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}
