//! Debounced, coalescing rebuild trigger.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

pub const DEFAULT_REBUILD_DELAY: Duration = Duration::from_secs(10);

/// Runs at most one pending rebuild at a time.
///
/// The first trigger arms a timer; triggers that arrive while it is armed
/// are dropped. When the timer fires the pending flag is cleared before the
/// job runs, so a change made during the rebuild schedules a new one.
#[derive(Debug, Clone)]
pub struct RebuildScheduler {
    pending: Arc<AtomicBool>,
    delay: Duration,
}

impl RebuildScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Arm the timer for `job`. Returns false when a rebuild was already
    /// pending or no tokio runtime is available.
    pub fn schedule<F, Fut>(&self, job: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, rebuild not scheduled");
            return false;
        };
        if self
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("rebuild already pending");
            return false;
        }

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        debug!(delay_ms = delay.as_millis() as u64, "rebuild scheduled");
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::SeqCst);
            job().await;
        });
        true
    }
}

impl Default for RebuildScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REBUILD_DELAY)
    }
}
