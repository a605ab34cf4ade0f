/// Time limits for individual requests
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("request timed out after {0:?}")]
    Elapsed(Duration),
    #[error("{0}")]
    Failed(E),
}

/// Execute a fallible future with a time limit, keeping the inner error type
pub async fn with_timeout_result<F, T, E>(
    duration: Duration,
    future: F,
) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Failed(e)),
        Err(_) => Err(TimeoutError::Elapsed(duration)),
    }
}
