//! Deadline, retry and range splitting policy shared by all chain calls.

use std::{future::Future, time::Duration};

use tracing::warn;

use crate::error::CrawlError;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded exponential backoff with per-call deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// # Panics
    ///
    /// If `max_attempts` is zero.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        call_timeout: Duration,
    ) -> Self {
        assert!(max_attempts > 0, "at least one attempt is required");
        Self {
            max_attempts,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            call_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Delay before the attempt following the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Whether a failed log query over `span` blocks should be bisected
    /// instead of retried.
    pub fn should_split(&self, err: &CrawlError, span: u64) -> bool {
        span > 1 && matches!(err, CrawlError::RangeTooLarge(_) | CrawlError::Timeout)
    }

    /// Runs `op` under the call deadline, repeating transient failures
    /// with backoff. Errors for which `give_up` holds are returned at once.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        give_up: impl Fn(&CrawlError) -> bool,
        mut op: F,
    ) -> Result<T, CrawlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CrawlError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => CrawlError::Timeout,
            };
            if give_up(&err) || !err.is_transient() {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                return Err(CrawlError::RetriesExhausted {
                    operation,
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
            let delay = self.backoff(attempt);
            warn!(operation, attempt, ?delay, %err, "Retrying failed call");
            tokio::time::sleep(delay).await;
        }
    }
}
