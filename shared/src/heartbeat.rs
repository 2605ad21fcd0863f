//! # Heartbeat
//!
//! A single scheduled task that calls a supplied health function on
//! `heartbeatInterval` (§4.6). An interval of zero disables the task
//! entirely — the composition root simply never spawns it.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs `health_check` every `interval` until `shutdown` is cancelled.
///
/// Callers are expected to check `interval.is_zero()` before spawning this —
/// it is not this function's job to decide whether heartbeating is enabled.
pub async fn run<F, Fut>(interval: Duration, shutdown: CancellationToken, mut health_check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), crate::errors::ProxyError>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("heartbeat stopped");
                return;
            }
            _ = ticker.tick() => {
                if let Err(err) = health_check().await {
                    warn!(error = %err, "heartbeat health check failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_the_health_check_at_least_once_then_stops_on_cancel() {
        let calls = Arc::new(AtomicU32::new(0));
        let shutdown = CancellationToken::new();

        let calls_clone = calls.clone();
        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn(async move {
            run(Duration::from_millis(10), shutdown_clone, || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
