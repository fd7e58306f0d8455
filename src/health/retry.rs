use backoff::{future::retry, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;

use crate::utils::AppError;

/// Exponential backoff for backend REST calls
pub(crate) fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_interval: Duration::from_secs(5),
        max_elapsed_time: Some(Duration::from_secs(10)),
        multiplier: 2.0,
        ..Default::default()
    }
}

/// Runs `operation`, retrying transient failures with exponential backoff.
///
/// Permanent failures (see [`AppError::is_transient`]) are returned at once.
pub async fn with_retry<F, Fut, T>(backoff: ExponentialBackoff, operation: F) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    retry(backoff, || async {
        match operation().await {
            Ok(result) => Ok(result),
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, code = e.error_code(), "Retryable error, will retry");
                Err(backoff::Error::transient(e))
            }
            Err(e) => {
                tracing::error!(error = %e, code = e.error_code(), "Permanent error, not retrying");
                Err(backoff::Error::permanent(e))
            }
        }
    })
    .await
}
