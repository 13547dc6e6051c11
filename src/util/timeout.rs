//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::http::transport::TransportError;

/// Wrap a transport future with a deadline.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            timeout_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
