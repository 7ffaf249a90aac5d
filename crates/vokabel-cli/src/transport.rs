//! Transport selection for the CLI client

use vokabel_core::config::ClientConfig;
use vokabel_core::sync::{HttpTransport, SyncError, SyncRequest, SyncResponse, SyncTransport};

/// HTTP when a server is configured, otherwise a transport that refuses to
/// sync so local commands keep working offline.
#[derive(Debug)]
pub enum CliTransport {
    Http(HttpTransport),
    Offline,
}

impl CliTransport {
    pub fn from_config(config: &ClientConfig) -> Result<Self, SyncError> {
        match config.sync_endpoint() {
            Some(endpoint) => Ok(Self::Http(HttpTransport::new(
                endpoint,
                config.sync_token.clone(),
                config.http_timeout,
            )?)),
            None => Ok(Self::Offline),
        }
    }

    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Http(transport) => Some(transport.endpoint()),
            Self::Offline => None,
        }
    }
}

impl SyncTransport for CliTransport {
    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        match self {
            Self::Http(transport) => transport.push(request).await,
            Self::Offline => Err(SyncError::InvalidConfiguration(
                "VOKABEL_SERVER_URL is not set".to_string(),
            )),
        }
    }
}
