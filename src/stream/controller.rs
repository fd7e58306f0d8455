//! Live log stream controller
//!
//! Owns one streaming connection and its buffered output:
//! - connect / disconnect / clear
//! - automatic reconnect with exponential backoff
//! - heartbeat tracking
//! - bounded log buffering
//!
//! Connection readers and retry timers run as spawned tasks that only hold a
//! `Weak` reference to the controller state. Each task carries the generation
//! it was started for and is ignored once the generation moves on, so a closed
//! connection or cancelled retry can never touch the state again.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::{whole_seconds, ReconnectBackoff};
use super::buffer::{LogBuffer, DEFAULT_MAX_LOG_LINES};
use super::event::{parse_log_payload, LogEvent};
use super::export::render_line;
use super::transport::{StreamConnector, StreamFrame};
use super::url::build_stream_url;

pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_DISCONNECTED: &str = "Disconnected";
pub const STATUS_URL_REQUIRED: &str = "Server URL is required.";
pub const STATUS_INVALID_URL: &str = "Invalid stream URL. Check the server base URL.";

const DEFAULT_LOG_CHANNEL_CAPACITY: usize = 1024;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URL and job filter of the most recent connect call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTarget {
    pub base_url: String,
    pub job_id: String,
}

/// Observable controller status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub state: ConnectionState,
    /// Human-readable status line
    pub text: String,
    /// Consecutive failed connections since the last successful one
    pub retry_attempt: u32,
    /// Delay of the pending automatic reconnect, if any
    pub retry_delay: Option<Duration>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub line_count: usize,
    /// Payloads discarded by the parser
    pub dropped_count: u64,
    pub target: Option<StreamTarget>,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            text: STATUS_IDLE.to_string(),
            retry_attempt: 0,
            retry_delay: None,
            last_heartbeat_at: None,
            line_count: 0,
            dropped_count: 0,
            target: None,
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub max_log_lines: usize,
    pub backoff: ReconnectBackoff,
    /// Capacity of the per-subscriber log broadcast queue
    pub log_channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            backoff: ReconnectBackoff::default(),
            log_channel_capacity: DEFAULT_LOG_CHANNEL_CAPACITY,
        }
    }
}

impl ControllerConfig {
    pub fn with_max_log_lines(mut self, max_log_lines: usize) -> Self {
        self.max_log_lines = max_log_lines;
        self
    }

    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Live log stream controller
///
/// All methods are synchronous and never fail; outcomes are reported through
/// [`StreamStatus`]. `connect` spawns tasks and must run inside a tokio
/// runtime. Dropping the controller behaves like a user disconnect.
pub struct StreamController {
    shared: Arc<Mutex<Inner>>,
}

struct Inner {
    self_ref: Weak<Mutex<Inner>>,
    connector: Arc<dyn StreamConnector>,
    backoff: ReconnectBackoff,
    buffer: LogBuffer,
    status: StreamStatus,
    status_tx: watch::Sender<StreamStatus>,
    log_tx: broadcast::Sender<LogEvent>,
    /// Set by disconnect/teardown, cleared by connect
    manual_disconnect: bool,
    generation: u64,
    connection: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StreamController {
    pub fn new<C: StreamConnector>(connector: C, config: ControllerConfig) -> Self {
        Self::with_shared_connector(Arc::new(connector), config)
    }

    pub fn with_shared_connector(
        connector: Arc<dyn StreamConnector>,
        config: ControllerConfig,
    ) -> Self {
        let status = StreamStatus::default();
        let (status_tx, _) = watch::channel(status.clone());
        let (log_tx, _) = broadcast::channel(config.log_channel_capacity.max(1));

        let shared = Arc::new_cyclic(|self_ref| {
            Mutex::new(Inner {
                self_ref: self_ref.clone(),
                connector,
                backoff: config.backoff,
                buffer: LogBuffer::new(config.max_log_lines),
                status,
                status_tx,
                log_tx,
                manual_disconnect: false,
                generation: 0,
                connection: None,
                retry: None,
            })
        });

        Self { shared }
    }

    /// Opens a stream to `{base_url}/logs/code-worker/stream[?jobId=..]`,
    /// replacing any existing connection.
    pub fn connect(&self, base_url: &str, job_id: &str) {
        lock(&self.shared).connect(base_url, job_id);
    }

    /// Closes the connection and cancels any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        lock(&self.shared).disconnect();
    }

    /// Empties the log buffer without touching the connection
    pub fn clear(&self) {
        lock(&self.shared).clear();
    }

    pub fn status(&self) -> StreamStatus {
        lock(&self.shared).status.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        lock(&self.shared).status_tx.subscribe()
    }

    /// Receives every event appended to the buffer from now on
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEvent> {
        lock(&self.shared).log_tx.subscribe()
    }

    /// Buffered events, oldest first
    pub fn snapshot(&self) -> Vec<LogEvent> {
        lock(&self.shared).buffer.snapshot()
    }

    /// Buffered events rendered for display
    pub fn rendered_lines(&self) -> Vec<String> {
        lock(&self.shared).buffer.iter().map(render_line).collect()
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        lock(&self.shared).teardown();
    }
}

impl Inner {
    fn connect(&mut self, base_url: &str, job_id: &str) {
        let base_url = base_url.trim();
        if base_url.is_empty() {
            warn!("Connect rejected: blank server URL");
            self.set_state(ConnectionState::Error, STATUS_URL_REQUIRED);
            return;
        }

        self.manual_disconnect = false;
        self.invalidate();

        let stream_url = build_stream_url(base_url, job_id);
        self.status.target = Some(StreamTarget {
            base_url: base_url.to_string(),
            job_id: job_id.to_string(),
        });

        if !is_http_url(&stream_url) {
            warn!(url = %stream_url, "Connect rejected: invalid stream URL");
            self.set_state(ConnectionState::Error, STATUS_INVALID_URL);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Connect called outside of a tokio runtime");
                self.set_state(ConnectionState::Error, "No async runtime available.");
                return;
            }
        };

        let generation = self.generation;
        info!(url = %stream_url, generation, "Connecting to log stream");
        self.set_state(
            ConnectionState::Connecting,
            format!("Connecting to {}", stream_url),
        );

        self.connection = Some(runtime.spawn(run_connection(
            self.self_ref.clone(),
            Arc::clone(&self.connector),
            stream_url,
            generation,
        )));
    }

    fn disconnect(&mut self) {
        self.manual_disconnect = true;
        self.invalidate();
        if self.status.state != ConnectionState::Disconnected {
            info!("Disconnected from log stream");
        }
        self.set_state(ConnectionState::Disconnected, STATUS_DISCONNECTED);
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.status.line_count = 0;
        self.publish();
    }

    fn teardown(&mut self) {
        self.manual_disconnect = true;
        self.invalidate();
        self.buffer.clear();
        self.status.line_count = 0;
        self.set_state(ConnectionState::Disconnected, STATUS_DISCONNECTED);
        debug!("Stream controller torn down");
    }

    /// Aborts the connection and retry tasks and retires their generation
    fn invalidate(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        self.status.retry_delay = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.connection.is_some()
    }

    fn on_opened(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.mark_connected();
        true
    }

    fn on_frame(&mut self, generation: u64, frame: StreamFrame) -> bool {
        if !self.is_current(generation) {
            return false;
        }

        match frame.event.as_str() {
            "connected" => self.mark_connected(),
            "heartbeat" => {
                self.status.last_heartbeat_at = Some(Utc::now());
                self.publish();
            }
            "log" | "message" | "" => self.ingest(&frame.data),
            other => debug!(event = %other, "Ignoring unknown stream event"),
        }
        true
    }

    fn on_failure(&mut self, generation: u64, reason: &str) {
        if !self.is_current(generation) {
            return;
        }
        // The reader task is finishing on its own
        self.connection = None;

        if self.manual_disconnect {
            self.set_state(ConnectionState::Disconnected, STATUS_DISCONNECTED);
            return;
        }

        self.status.retry_attempt = self.status.retry_attempt.saturating_add(1);
        let attempt = self.status.retry_attempt;
        let delay = self.backoff.delay_for(attempt);

        warn!(
            reason = %reason,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Log stream connection lost, scheduling reconnect"
        );

        self.status.retry_delay = Some(delay);
        self.set_state(
            ConnectionState::Error,
            format!(
                "Connection lost. Reconnecting in {}s...",
                whole_seconds(delay)
            ),
        );
        self.schedule_retry(generation, delay);
    }

    fn schedule_retry(&mut self, generation: u64, delay: Duration) {
        if let Some(previous) = self.retry.take() {
            previous.abort();
        }

        let self_ref = self.self_ref.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("Cannot schedule reconnect outside of a tokio runtime");
            return;
        };

        self.retry = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = self_ref.upgrade() {
                lock(&shared).on_retry_due(generation);
            }
        }));
    }

    fn on_retry_due(&mut self, generation: u64) {
        if self.generation != generation || self.retry.is_none() || self.manual_disconnect {
            return;
        }
        self.retry = None;

        let Some(target) = self.status.target.clone() else {
            return;
        };
        debug!(
            base_url = %target.base_url,
            job_id = %target.job_id,
            attempt = self.status.retry_attempt,
            "Reconnecting to log stream"
        );
        self.connect(&target.base_url, &target.job_id);
    }

    fn mark_connected(&mut self) {
        if self.status.state != ConnectionState::Connected {
            info!(generation = self.generation, "Log stream connected");
        }
        self.status.retry_attempt = 0;
        self.status.retry_delay = None;
        self.set_state(ConnectionState::Connected, STATUS_CONNECTED);
    }

    fn ingest(&mut self, payload: &str) {
        let Some(event) = parse_log_payload(payload) else {
            self.status.dropped_count += 1;
            debug!(
                dropped_count = self.status.dropped_count,
                "Dropping malformed log payload"
            );
            self.publish();
            return;
        };

        self.buffer.push(event.clone());
        self.status.line_count = self.buffer.len();
        // No receivers is fine
        let _ = self.log_tx.send(event);
        self.publish();
    }

    fn set_state(&mut self, state: ConnectionState, text: impl Into<String>) {
        self.status.state = state;
        self.status.text = text.into();
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }
}

fn is_http_url(value: &str) -> bool {
    ::url::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// Reads one connection until it fails, ends, or its generation goes stale
async fn run_connection(
    shared: Weak<Mutex<Inner>>,
    connector: Arc<dyn StreamConnector>,
    url: String,
    generation: u64,
) {
    let mut frames = match connector.open(&url).await {
        Ok(frames) => frames,
        Err(e) => {
            report_failure(&shared, generation, &e.to_string());
            return;
        }
    };

    if !with_inner(&shared, |inner| inner.on_opened(generation)) {
        return;
    }

    while let Some(item) = frames.next().await {
        match item {
            Ok(frame) => {
                if !with_inner(&shared, |inner| inner.on_frame(generation, frame)) {
                    return;
                }
            }
            Err(e) => {
                report_failure(&shared, generation, &e.to_string());
                return;
            }
        }
    }

    report_failure(&shared, generation, "stream closed by server");
}

fn with_inner(shared: &Weak<Mutex<Inner>>, f: impl FnOnce(&mut Inner) -> bool) -> bool {
    match shared.upgrade() {
        Some(shared) => f(&mut lock(&shared)),
        None => false,
    }
}

fn report_failure(shared: &Weak<Mutex<Inner>>, generation: u64, reason: &str) {
    with_inner(shared, |inner| {
        inner.on_failure(generation, reason);
        false
    });
}
