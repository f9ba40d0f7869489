//! Periodic sweep of expired cache entries.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TtlCache;

/// Handle to a running sweep task.
///
/// The task stops when [`CacheJanitor::stop`] is called or when the shutdown
/// token it was started with is cancelled.
#[derive(Debug)]
pub struct CacheJanitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CacheJanitor {
    /// Cancel the sweep and wait for the task to finish
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Cache janitor task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Start sweeping expired entries every `interval`.
    ///
    /// Returns `None` when expiry is disabled or the interval is zero; there is
    /// nothing for a sweep to do in either case.
    pub fn start_janitor(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: &CancellationToken,
    ) -> Option<CacheJanitor> {
        if self.ttl().is_zero() || interval.is_zero() {
            debug!(
                ttl_ms = self.ttl().as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "Cache janitor not started"
            );
            return None;
        }

        let token = shutdown.child_token();
        let cache = Arc::clone(self);
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "Cache sweep removed expired entries");
                        }
                    }
                }
            }

            debug!("Cache janitor stopped");
        });

        info!(
            interval_ms = interval.as_millis() as u64,
            ttl_ms = self.ttl().as_millis() as u64,
            "🧹 Cache janitor started"
        );

        Some(CacheJanitor { token, handle })
    }
}
