//! Time bound for calls to external services.

use std::future::Future;
use std::time::Duration;

use crate::error::SagaError;

/// Awaits `call`, failing with [`SagaError::Timeout`] once `limit` elapses.
pub async fn with_timeout<T, F>(
    service: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, SagaError>
where
    F: Future<Output = Result<T, SagaError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            metrics::counter!("external_timeouts_total", "service" => service).increment(1);
            Err(SagaError::Timeout {
                service,
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}
