//! Transports that carry a [`SyncRequest`] to the authoritative collection

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};

use super::collection::MemoryCollection;
use super::merge::merge_delta;
use super::protocol::{ProtocolError, SyncRequest, SyncResponse};
use crate::timestamp::{self, Timestamp};
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure or timeout; retried on the next natural cycle
    #[error("Sync transport failed: {0}")]
    Transport(String),
    /// Server answered 400
    #[error("Server rejected the sync payload: {0}")]
    Rejected(String),
    /// Server answered 401; the client halts until reconfigured
    #[error("Server rejected the sync token")]
    Unauthorized,
    #[error("Sync server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Malformed sync response: {0}")]
    MalformedResponse(#[from] ProtocolError),
    #[error("A sync cycle is already in flight")]
    InFlight,
    #[error("Sync is halted after an authorization failure; fix the token and resume")]
    Halted,
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// Whether the next natural cycle may succeed without reconfiguration.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. } | Self::InFlight)
    }
}

/// Carries one delta to the server and returns its answer.
pub trait SyncTransport: Send + Sync {
    fn push(
        &self,
        request: &SyncRequest,
    ) -> impl Future<Output = Result<SyncResponse, SyncError>> + Send;
}

/// Transport over `POST /api/words/sync`
#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SyncError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            endpoint,
            token: normalize_text_option(token),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SyncTransport for HttpTransport {
    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        Ok(SyncResponse::decode(&body)?)
    }
}

fn transport_error(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Transport(format!("request timed out: {error}"))
    } else {
        SyncError::Transport(error.to_string())
    }
}

/// Error for a non-success answer from the sync endpoint
fn status_error(status: StatusCode, body: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
        StatusCode::BAD_REQUEST => SyncError::Rejected(parse_api_error(status, body)),
        _ => SyncError::Server {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return compact_text(&message);
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

fn normalize_endpoint(raw: String) -> Result<String, SyncError> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        SyncError::InvalidConfiguration("endpoint must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

/// In-process transport that merges into a shared [`MemoryCollection`].
///
/// Requests and responses still pass through the JSON codec, so decode rules
/// apply exactly as they would over HTTP. Server times handed out to devices
/// sharing a transport strictly increase.
#[derive(Clone, Default)]
pub struct LocalTransport {
    collection: Arc<Mutex<MemoryCollection>>,
    last_server_time: Arc<std::sync::Mutex<Option<Timestamp>>>,
    calls: Arc<AtomicUsize>,
    next_failure: Arc<std::sync::Mutex<Option<SyncError>>>,
    gate: Arc<RwLock<()>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Another device talking to the same collection
    #[must_use]
    pub fn device(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            last_server_time: Arc::clone(&self.last_server_time),
            ..Self::default()
        }
    }

    pub fn collection(&self) -> Arc<Mutex<MemoryCollection>> {
        Arc::clone(&self.collection)
    }

    /// Number of pushes attempted so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next push with `error` instead of reaching the collection.
    pub fn fail_next(&self, error: SyncError) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(error);
        }
    }

    /// Hold pushes at the door until the returned guard is dropped.
    pub async fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.gate).write_owned().await
    }

    fn next_server_time(&self) -> Timestamp {
        let mut last = self
            .last_server_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = timestamp::stamp_after(timestamp::now(), *last);
        *last = Some(now);
        now
    }
}

impl SyncTransport for LocalTransport {
    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .next_failure
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(error) = failure {
            return Err(error);
        }

        let _open = self.gate.read().await;
        let body = serde_json::to_vec(request)
            .map_err(|error| SyncError::Transport(error.to_string()))?;

        let response = {
            let mut collection = self.collection.lock().await;
            let now = self.next_server_time();
            let request = SyncRequest::decode(&body, now)
                .map_err(|error| SyncError::Rejected(error.to_string()))?;
            merge_delta(&mut *collection, &request, now).map_err(|error| SyncError::Server {
                status: 500,
                message: error.to_string(),
            })?
        };

        let body = serde_json::to_vec(&response)
            .map_err(|error| SyncError::Transport(error.to_string()))?;
        Ok(SyncResponse::decode(&body)?)
    }
}
