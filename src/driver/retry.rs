//! Retry policy for `execute_read`/`execute_write`.
//!
//! Exponential backoff with jitter: `min(1000 * 2^(n-1) + random(0..1000), 5000)`
//! milliseconds before attempt `n+1`, retrying while the failure is
//! classified as transient, bounded by a wall-clock time budget rather than
//! an attempt count — a transient error that keeps recurring quickly is
//! retried many more times than one recovering slowly.

use rand::Rng;
use tokio::time::{sleep, Duration, Instant};

use crate::Error;

const MAX_DELAY_MS: u64 = 5000;
/// Default budget when a caller doesn't supply one via `Config`.
pub const DEFAULT_MAX_RETRY_TIME: Duration = Duration::from_secs(30);

pub fn is_retryable(err: &Error) -> bool {
    if err.is_retryable() {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    ["deadlock", "transient", "temporarily unavailable", "leader switch", "connection"]
        .iter()
        .any(|needle| msg.contains(needle))
}

fn backoff_delay_ms(attempt: u32) -> u64 {
    let base = 1000u64.saturating_mul(1u64 << attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..1000);
    (base.saturating_add(jitter)).min(MAX_DELAY_MS)
}

/// Runs `work` until it succeeds, a non-retryable error occurs, or the
/// wall-clock time budget (`DEFAULT_MAX_RETRY_TIME`) expires.
pub async fn with_retry<T, F, Fut>(work: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    with_retry_budget(DEFAULT_MAX_RETRY_TIME, work).await
}

/// Same as [`with_retry`] but with an explicit budget, e.g. taken from
/// `driver::Config::max_transaction_retry_time`.
pub async fn with_retry_budget<T, F, Fut>(max_retry_time: Duration, mut work: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let start = Instant::now();
    let mut attempt = 1u32;
    loop {
        match work().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !is_retryable(&e) || start.elapsed() >= max_retry_time {
                    return Err(e);
                }
                let delay = backoff_delay_ms(attempt);
                tracing::warn!(attempt, delay, error = %e, "retrying transient failure");
                sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_caps_at_five_seconds() {
        for attempt in 1..10 {
            assert!(backoff_delay_ms(attempt) <= MAX_DELAY_MS);
        }
    }

    #[test]
    fn classifies_transient_messages() {
        assert!(is_retryable(&Error::StorageError("database is locked".into())));
        assert!(is_retryable(&Error::ExecutionError("leader switch in progress".into())));
        assert!(!is_retryable(&Error::SyntaxError { position: 0, message: "bad token".into() }));
    }

    #[tokio::test]
    async fn zero_budget_gives_up_after_the_first_failure() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: crate::Result<()> = with_retry_budget(Duration::from_millis(0), || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(Error::StorageError("database is locked".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_without_waiting_for_the_budget() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: crate::Result<()> = with_retry_budget(Duration::from_secs(30), || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(Error::SyntaxError { position: 0, message: "bad token".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retrying_when_work_succeeds_immediately() {
        let result = with_retry_budget(Duration::from_secs(30), || async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
