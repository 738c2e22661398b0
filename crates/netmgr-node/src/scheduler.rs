//! Periodic background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run `task` every `period` after `initial_delay` until `shutdown` fires.
///
/// Each run is awaited before the next tick is taken, so runs never
/// overlap; ticks missed while a run is in progress are skipped. A run
/// already in progress when shutdown fires completes first.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    initial_delay: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {}
            _ = shutdown.changed() => {
                tracing::debug!(task = name, "stopped before first run");
                return;
            }
        }

        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(task = name, period_secs = period.as_secs(), "periodic task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::trace!(task = name, "tick");
                    task().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!(task = name, "periodic task stopped");
    })
}
