pub mod client;
pub mod retry;

pub use client::{HealthClient, HealthResponse, HealthState, HealthStatus};
pub use retry::with_retry;
