//! C14 — Lifecycle Manager (spec §4.14, §9).
//!
//! Orders startup ("initialize C1..C10 in dependency order" happens in
//! [`crate::Runtime::init`]; this manager owns what happens *after* that:
//! spawning the two long-lived background timers and tearing them down on
//! shutdown) and bounds shutdown by a grace period, grounded on the
//! teacher's `ipc_server_main.rs` shutdown sequence (`ctrl_c` → abort
//! handles), generalized from "abort immediately" to "wait up to a grace
//! period, then proceed regardless".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cache::CacheEngine;
use crate::error::Result;
use crate::invalidation::InvalidationEngine;
use crate::metrics::MetricsCollector;

/// Owns the process-wide background tasks (scheduled-invalidation tick,
/// lazy-flush tick) and coordinates their shutdown with the rest of the
/// runtime (spec §9: "package them as tasks with a stop signal").
pub struct LifecycleManager {
    cancellation: CancellationToken,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    engine: Arc<CacheEngine>,
    metrics: Arc<MetricsCollector>,
    grace_period: Duration,
    shutting_down: AtomicBool,
}

impl LifecycleManager {
    pub fn new(engine: Arc<CacheEngine>, metrics: Arc<MetricsCollector>, grace_period: Duration) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            background_tasks: Mutex::new(Vec::new()),
            engine,
            metrics,
            grace_period,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Starts the invalidation engine's background timers under this
    /// manager's cancellation token (spec §4.9, §5).
    pub fn start_invalidation_timers(&self, invalidation: &Arc<InvalidationEngine>, lazy_tick: Duration, scheduled_tick: Duration) {
        let handles = invalidation.spawn_timers(lazy_tick, scheduled_tick, self.cancellation.clone());
        self.background_tasks.lock().extend(handles);
    }

    /// Registers an already-spawned background task (e.g. a predictive
    /// warmer loop) so shutdown waits for it too.
    pub fn track(&self, handle: JoinHandle<()>) {
        self.background_tasks.lock().push(handle);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Idempotent, bounded shutdown: signal cancellation, flush C3, close
    /// C4, then wait up to `grace_period` for every tracked task to finish.
    /// A stuck handler is logged at WARN and the process proceeds anyway
    /// (spec §4.14: "shutdown ... bounded in wall time").
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancellation.cancel();
        self.metrics.flush();
        self.engine.flush()?;

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background_tasks.lock());
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.grace_period, join_all).await.is_err() {
            warn!(grace_period_ms = self.grace_period.as_millis(), "shutdown grace period elapsed; exiting with background tasks still in flight");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (LifecycleManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let metrics = Arc::new(MetricsCollector::new(1000));
        (LifecycleManager::new(engine, metrics, Duration::from_millis(200)), dir)
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (manager, _dir) = manager();
        manager.shutdown().await.unwrap();
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_cancels_the_token_so_tracked_tasks_observe_it() {
        let (manager, _dir) = manager();
        let token = manager.cancellation_token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        manager.track(handle);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stuck_task_does_not_block_shutdown_past_the_grace_period() {
        let (manager, _dir) = manager();
        manager.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));
        let start = std::time::Instant::now();
        manager.shutdown().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
