/// Exponential backoff with jitter and a bounded attempt budget
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Maximum number of attempts (the first try counts)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay, jitter included
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Add random jitter to each delay (±30%)
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_last(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Stateful delay generator.
///
/// `next_delay` yields the wait before the next attempt, or `None` once the
/// attempt budget is spent.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay;
        Self {
            config,
            attempts: 0,
            current,
        }
    }

    /// Attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// Record one failed attempt and return how long to wait before the next one.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.is_exhausted() {
            return None;
        }

        let delay = apply_jitter(self.current, self.config.jitter).min(self.config.max_delay);

        self.current = Duration::from_millis(
            ((self.current.as_millis() as f64 * self.config.multiplier)
                .min(self.config.max_delay.as_millis() as f64)) as u64,
        );

        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.config.initial_delay;
    }
}

/// Run `f` until it succeeds or the attempt budget runs out.
///
/// `f` receives the zero-based attempt number.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &BackoffConfig,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = Backoff::new(config.clone());

    loop {
        let attempt = backoff.attempts();
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        error = %e,
                        "Attempt {}/{} failed, retrying in {:?}",
                        attempt + 1,
                        config.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(error = %e, "Giving up after {} attempts", backoff.attempts());
                    return Err(RetryError::Exhausted {
                        attempts: backoff.attempts(),
                        last: e,
                    });
                }
            },
        }
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    } else {
        base
    }
}
