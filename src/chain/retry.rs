use crate::error::{Result, SyncError};
use alloy_transport::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Exponential backoff bounded by a wall-clock deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    pub const fn new(initial_backoff: Duration, max_backoff: Duration, deadline: Duration) -> Self {
        Self { initial_backoff, max_backoff, deadline }
    }

    /// Reads issued while (re)initializing may wait out long provider outages.
    pub const fn startup() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), Duration::from_secs(6 * 60 * 60))
    }

    pub const fn polling() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), Duration::from_secs(600))
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Delay before retry number `attempt` (1-based): initial * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_backoff.saturating_mul(1u32 << exp).min(self.max_backoff)
    }
}

/// True for failures a retry cannot fix: reverted calls and requests the node
/// refuses as malformed. Rate limits are never permanent.
pub fn is_permanent(error: &TransportError) -> bool {
    if error.is_ser_error() {
        return true;
    }
    error.as_error_resp().is_some_and(|resp| {
        !resp.is_retry_err()
            && (resp.code == 3 || resp.code == -32602 || resp.message.to_ascii_lowercase().contains("revert"))
    })
}

/// Retries `op` on transient transport errors until it succeeds or the next
/// wait would cross the policy deadline. The last transport error is kept as
/// the source. Permanent errors fail on the first attempt.
pub async fn retry_until_deadline<T, F, Fut>(operation: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, TransportError>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!("{} succeeded after {} attempts", operation, attempts);
                }
                return Ok(value);
            }
            Err(e) if is_permanent(&e) => {
                return Err(SyncError::CallRejected { operation: operation.to_string(), source: e });
            }
            Err(e) => {
                let elapsed = started.elapsed();
                let delay = policy.backoff(attempts);
                if elapsed + delay > policy.deadline {
                    return Err(SyncError::RetryDeadlineExceeded {
                        operation: operation.to_string(),
                        attempts,
                        elapsed,
                        source: e,
                    });
                }
                warn!("{} failed (attempt {}), retrying in {:?}: {}", operation, attempts, delay, e);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_transport::TransportErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60), Duration::from_secs(600));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(7), Duration::from_secs(60));
        assert_eq!(policy.backoff(200), Duration::from_secs(60));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::startup().deadline, Duration::from_secs(21_600));
        assert!(RetryPolicy::polling().deadline < RetryPolicy::startup().deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_until_deadline("flaky", &RetryPolicy::polling(), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(TransportErrorKind::custom_str("connection reset"))
            } else {
                Ok(42u64)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_past_deadline() {
        let policy = RetryPolicy::polling().with_deadline(Duration::from_secs(10));
        let started = Instant::now();

        let result: Result<u64> = retry_until_deadline("dead", &policy, || async {
            Err(TransportErrorKind::custom_str("503"))
        })
        .await;

        match result {
            Err(SyncError::RetryDeadlineExceeded { operation, attempts, elapsed, .. }) => {
                assert_eq!(operation, "dead");
                // waits 1 + 2 + 4 = 7s, the next 8s wait would cross 10s
                assert_eq!(attempts, 4);
                assert_eq!(elapsed, Duration::from_secs(7));
            }
            other => panic!("expected deadline error, got {other:?}"),
        }
        assert!(started.elapsed() <= Duration::from_secs(10));
    }

    fn error_response(json: &str) -> TransportError {
        TransportError::err_resp(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_classifies_permanent_errors() {
        assert!(is_permanent(&error_response(r#"{"code":3,"message":"execution reverted"}"#)));
        assert!(is_permanent(&error_response(r#"{"code":-32000,"message":"Execution Reverted: SafeMath"}"#)));
        assert!(is_permanent(&error_response(r#"{"code":-32602,"message":"invalid argument 0"}"#)));

        assert!(!is_permanent(&error_response(r#"{"code":429,"message":"rate limit exceeded"}"#)));
        assert!(!is_permanent(&error_response(r#"{"code":-32000,"message":"header not found"}"#)));
        assert!(!is_permanent(&TransportErrorKind::custom_str("connection reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_fails_without_retrying() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = Instant::now();

        let result: Result<u64> = retry_until_deadline("X.balanceOf", &RetryPolicy::startup(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(error_response(r#"{"code":3,"message":"execution reverted"}"#))
        })
        .await;

        match result {
            Err(SyncError::CallRejected { operation, .. }) => assert_eq!(operation, "X.balanceOf"),
            other => panic!("expected rejected call, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
