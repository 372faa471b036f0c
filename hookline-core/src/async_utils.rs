//! Async utilities and patterns
//!
//! Bounded waits and periodic background jobs

use crate::error::{CoreError, CoreResult, ErrorContext};
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, MissedTickBehavior};
use tracing::debug;

/// Bound `future` by `limit`, reporting an elapsed wait as `CoreError::Timeout`
pub async fn with_timeout<F, T>(future: F, limit: Duration, operation_name: &str) -> CoreResult<T>
where
    F: Future<Output = T>,
{
    match timeout(limit, future).await {
        Ok(result) => Ok(result),
        Err(_) => {
            let duration_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            Err(CoreError::Timeout {
                operation: operation_name.to_string(),
                duration_ms,
                context: ErrorContext::new("async_utils")
                    .with_operation("timeout")
                    .with_metadata("timeout_ms", &duration_ms.to_string())
                    .with_suggestion("Increase timeout duration")
                    .with_suggestion("Verify the backing service is available"),
            })
        }
    }
}

/// Handle to a periodic job started with [`spawn_periodic`]
///
/// Dropping the handle stops the job after its current tick.
pub struct PeriodicJob {
    interval: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicJob {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the job and wait for it to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicJob {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Run `job` every `interval` on the tokio runtime until the returned handle is dropped
pub fn spawn_periodic<F, Fut>(job_name: &'static str, interval: Duration, job: F) -> PeriodicJob
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => job().await,
                _ = &mut shutdown_rx => {
                    debug!(job = job_name, "Periodic job stopped");
                    break;
                }
            }
        }
    });

    PeriodicJob {
        interval,
        shutdown_tx: Some(shutdown_tx),
        handle: Some(handle),
    }
}
