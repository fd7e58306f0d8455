pub mod error;
pub mod logging;

pub use error::AppError;
pub use logging::{init_logging, ConsoleFormat, LogOptions};
