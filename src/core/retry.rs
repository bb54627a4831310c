//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::core::errors::{ErrorClass, TranslationError};

/// Outcome of a single attempt
#[derive(Debug)]
pub enum Attempt<T> {
    /// The call succeeded
    Success(T),
    /// The call failed but may succeed later
    Transient(TranslationError),
    /// The call failed and retrying cannot help
    Fatal(TranslationError),
}

impl<T> From<Result<T, TranslationError>> for Attempt<T> {
    fn from(result: Result<T, TranslationError>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(err) if err.class() == ErrorClass::Transient => Attempt::Transient(err),
            Err(err) => Attempt::Fatal(err),
        }
    }
}

/// A value together with how many retries it took
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

/// Backoff schedule; one attempt per entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Create a policy from an explicit schedule
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    /// Doubling schedule starting at `base`
    pub fn exponential(base: Duration, attempts: u32) -> Self {
        Self::new((0..attempts).map(|i| base * 2_u32.pow(i)).collect())
    }

    /// Total number of attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.backoff.len().max(1) as u32
    }

    /// Delay after the failed attempt `attempt` (zero based)
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        self.backoff.get(attempt as usize).copied()
    }

    /// Run `op` until it succeeds, fails fatally, or the schedule runs out.
    ///
    /// The backoff sleep also follows the last transient failure, so a
    /// rate-limited endpoint gets the full cool-down before the caller moves on.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<Retried<T>, TranslationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Attempt::Success(value) => {
                    if attempt > 0 {
                        debug!("Succeeded after {} retries", attempt);
                    }
                    return Ok(Retried {
                        value,
                        retries: attempt,
                    });
                }
                Attempt::Fatal(err) => return Err(err),
                Attempt::Transient(err) => {
                    let delay = self.delay_for(attempt).unwrap_or_default();
                    warn!(
                        "{} (attempt {}/{}), waiting {:?}",
                        err,
                        attempt + 1,
                        max_attempts,
                        delay
                    );
                    sleep(delay).await;

                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(TranslationError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(3), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhausts_with_backoff() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<Retried<()>, _> = RetryPolicy::default()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Transient(TranslationError::RateLimitError { retry_after: None }) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        match result {
            Err(TranslationError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, TranslationError::RateLimitError { .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_immediately() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<Retried<()>, _> = RetryPolicy::default()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Attempt::Fatal(TranslationError::AuthError {
                        status: 403,
                        message: "invalid_api_key".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(matches!(result, Err(TranslationError::AuthError { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient() {
        let result = RetryPolicy::default()
            .run(|attempt| async move {
                if attempt < 2 {
                    Attempt::Transient(TranslationError::TimeoutError)
                } else {
                    Attempt::Success("ok")
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, "ok");
        assert_eq!(result.retries, 2);
    }
}
