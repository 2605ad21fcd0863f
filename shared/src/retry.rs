//! # Retry policy
//!
//! Exponential backoff with jitter, shared by the Upstream client's callers
//! (the Refresher's poll/stream reconnect loop and the Metric service's
//! flush loop) so the two don't each reinvent their own. One policy, one
//! place to tune the constants (§4.3, §4.5).

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::errors::{ProxyError, ProxyResult};

const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);
const BACKOFF_FACTOR: u32 = 2;
const MAX_ATTEMPTS: u32 = 5;
const JITTER_FRACTION: f64 = 0.2;

/// Runs `operation` up to [`MAX_ATTEMPTS`] times, doubling the delay between
/// attempts (capped at [`MAX_DELAY`]) and jittering it by ±20% so that a
/// fleet of proxies doesn't retry in lockstep. Only retries errors classified
/// [`crate::errors::ErrorKind::Transient`]; anything else is returned
/// immediately.
pub async fn with_backoff<T, F, Fut>(label: &str, mut operation: F) -> ProxyResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ProxyResult<T>>,
{
    let mut attempt = 0;
    let mut delay = BASE_DELAY;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                let sleep_for = jitter(delay);
                debug!(
                    operation = label,
                    attempt,
                    delay_ms = sleep_for.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(sleep_for).await;
                delay = (delay * BACKOFF_FACTOR).min(MAX_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let spread = delay.as_secs_f64() * JITTER_FRACTION;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let calls = AtomicU32::new(0);
        let result: ProxyResult<i32> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result: ProxyResult<i32> = with_backoff("test", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(ProxyError::Timeout)
                } else {
                    Ok(99)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result: ProxyResult<i32> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProxyError::UnknownApiKey) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: ProxyResult<i32> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProxyError::Timeout) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
