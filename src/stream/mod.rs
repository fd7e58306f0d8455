//! Live code-worker log stream
//!
//! - Stream URL construction
//! - Log payload parsing and the bounded log buffer
//! - Reconnect backoff
//! - SSE transport
//! - The stream controller state machine
//! - Rendering and export helpers

pub mod backoff;
pub mod buffer;
pub mod controller;
pub mod event;
pub mod export;
pub mod transport;
pub mod url;

pub use backoff::ReconnectBackoff;
pub use buffer::LogBuffer;
pub use controller::{
    ConnectionState, ControllerConfig, StreamController, StreamStatus, StreamTarget,
};
pub use event::{parse_log_payload, LogEvent};
pub use export::{copy_visible, format_timestamp, render_line, visible_text, write_download};
pub use transport::{FrameStream, SseConnector, StreamConnector, StreamFrame};
pub use url::build_stream_url;
