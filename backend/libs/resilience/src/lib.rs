/// Resilience helpers shared by the notification services
///
/// - **Backoff**: bounded exponential backoff with jitter, used for reconnect loops
/// - **Timeout**: time limits on individual requests
///
/// # Example: reconnect with a bounded budget
///
/// ```rust,no_run
/// use resilience::{retry_with_backoff, BackoffConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let result = retry_with_backoff(&BackoffConfig::default(), |attempt| async move {
///         // dial the socket here
///         if attempt < 2 { Err("refused") } else { Ok(()) }
///     })
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod backoff;
pub mod timeout;

pub use backoff::{retry_with_backoff, Backoff, BackoffConfig, RetryError};
pub use timeout::{with_timeout_result, TimeoutError};
