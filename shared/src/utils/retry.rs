//! Retry utility with exponential backoff

use std::time::Duration;
use tracing::warn;

/// Errors that know whether a retry can help.
pub trait Retryable {
    /// `true` if the same operation may succeed when attempted again.
    fn is_transient(&self) -> bool;

    /// Minimum wait before the next attempt, when the failure says so
    /// (e.g. a rate-limit reset time).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Give up instead of sleeping when a `retry_after` hint exceeds this.
    pub max_wait_hint: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_wait_hint: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Retry an async operation with exponential backoff.
///
/// Returns `Ok` on first success. Permanent errors are returned immediately;
/// transient errors are retried until `max_attempts` is reached, and the last
/// error is returned. Delays: `initial_delay`, `2 * initial_delay`, ...
/// capped at `max_delay`, or the error's own `retry_after` hint if longer.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    policy: RetryPolicy,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + Retryable,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match f().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };

        if !err.is_transient() {
            return Err(err);
        }
        warn!(
            "{} failed (attempt {}/{}): {}",
            operation_name, attempt, max_attempts, err
        );
        if attempt >= max_attempts {
            return Err(err);
        }

        let mut delay = policy.delay_for_attempt(attempt);
        if let Some(hint) = err.retry_after() {
            if hint > policy.max_wait_hint {
                warn!(
                    "{}: server asks to wait {:?}, longer than {:?}; giving up",
                    operation_name, hint, policy.max_wait_hint
                );
                return Err(err);
            }
            delay = delay.max(hint);
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    enum TestError {
        Flaky(String),
        Fatal,
        Throttled(Duration),
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            !matches!(self, TestError::Fatal)
        }

        fn retry_after(&self) -> Option<Duration> {
            match self {
                TestError::Throttled(d) => Some(*d),
                _ => None,
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            max_wait_hint: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let result: Result<&str, TestError> =
            retry_with_backoff("test", fast_policy(3), || async { Ok("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result: Result<&str, TestError> =
            retry_with_backoff("test", fast_policy(3), move || {
                let counter = counter_clone.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::Relaxed);
                    if n < 2 {
                        Err(TestError::Flaky(format!("fail #{}", n)))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_all_attempts_fail() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result: Result<(), TestError> = retry_with_backoff("test", fast_policy(2), || {
            counter_clone.fetch_add(1, Ordering::Relaxed);
            async { Err(TestError::Flaky("always fails".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(TestError::Flaky(_))));
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result: Result<(), TestError> = retry_with_backoff("test", fast_policy(5), || {
            counter_clone.fetch_add(1, Ordering::Relaxed);
            async { Err(TestError::Fatal) }
        })
        .await;
        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_honoured() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let start = tokio::time::Instant::now();
        let result: Result<u32, TestError> = retry_with_backoff("test", fast_policy(2), || {
            let n = counter_clone.fetch_add(1, Ordering::Relaxed);
            async move {
                if n == 0 {
                    Err(TestError::Throttled(Duration::from_secs(2)))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_hint_beyond_limit_gives_up() {
        let result: Result<(), TestError> = retry_with_backoff("test", fast_policy(3), || async {
            Err(TestError::Throttled(Duration::from_secs(3600)))
        })
        .await;
        assert!(matches!(result, Err(TestError::Throttled(_))));
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            max_wait_hint: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }
}
