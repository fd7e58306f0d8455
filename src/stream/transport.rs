//! Stream transport: the connector seam and its SSE implementation.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::utils::AppError;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// One server-sent event as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Event name, `"message"` or empty for unnamed events
    pub event: String,
    pub data: String,
}

impl StreamFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// Unnamed default message
    pub fn message(data: impl Into<String>) -> Self {
        Self::new("message", data)
    }
}

/// Frames of one open connection. The stream ending means the server closed it.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, AppError>> + Send>>;

/// Opens long-lived event streams
///
/// Dropping the returned stream closes the connection.
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    /// Resolves once the server accepted the request
    async fn open(&self, url: &str) -> Result<FrameStream, AppError>;
}

/// `text/event-stream` connector over reqwest
#[derive(Debug, Clone)]
pub struct SseConnector {
    client: reqwest::Client,
}

impl SseConnector {
    pub fn new() -> Result<Self, AppError> {
        // No overall timeout: the response body never completes
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers
    }
}

#[async_trait]
impl StreamConnector for SseConnector {
    #[instrument(skip(self), level = "debug")]
    async fn open(&self, url: &str) -> Result<FrameStream, AppError> {
        let response = self.client.get(url).headers(Self::headers()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(AppError::upstream(status.as_u16(), snippet));
        }

        debug!(url = %url, status = %status, "Event stream opened");

        let frames = response.bytes_stream().eventsource().map(|item| match item {
            Ok(event) => Ok(StreamFrame {
                event: event.event,
                data: event.data,
            }),
            Err(err) => Err(AppError::transport(err.to_string())),
        });

        Ok(Box::pin(frames))
    }
}
