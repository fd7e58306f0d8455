pub mod config;
pub mod console;
pub mod health;
pub mod shutdown;
pub mod stream;
pub mod utils;

pub use config::AppConfig;
pub use stream::{
    build_stream_url, parse_log_payload, ConnectionState, ControllerConfig, LogEvent,
    SseConnector, StreamController, StreamStatus,
};
pub use utils::AppError;
