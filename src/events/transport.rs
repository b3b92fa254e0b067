use super::sse::decode_stream;
use super::Event;
use crate::session::SessionId;
use async_trait::async_trait;
use futures_util::Stream;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Live push connection yielding decoded application events
pub type EventConnection = Pin<Box<dyn Stream<Item = Result<Event, TransportError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Failed to connect to event stream: {0}")]
    Connect(String),

    #[error("Event stream returned HTTP {status}")]
    Status { status: u16 },

    #[error("Event stream read failed: {0}")]
    Read(String),

    #[error("Server reported a stream error: {0}")]
    Server(String),

    #[error("Event stream ended before completion")]
    Ended,
}

/// Opens push connections for a session
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn connect(&self, session_id: &SessionId) -> Result<EventConnection, TransportError>;
}

/// `GET {server}/api/events/{session_id}` over reqwest
#[derive(Debug, Clone)]
pub struct HttpEventTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEventTransport {
    /// The connection is long-lived, so only connecting is bounded by a timeout.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn events_url(&self, session_id: &SessionId) -> String {
        format!("{}/api/events/{}", self.base_url, session_id)
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn connect(&self, session_id: &SessionId) -> Result<EventConnection, TransportError> {
        let url = self.events_url(session_id);
        debug!(url = %url, "Opening event stream");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        Ok(Box::pin(decode_stream(response.bytes_stream())))
    }
}
