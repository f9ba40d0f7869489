//! # Ingestion Pipeline
//!
//! Single consumer loop over the order log. A message's position is committed
//! only after the order is stored and cached, or after the message is judged
//! unusable (malformed or invalid) and skipped. A failed persist leaves the
//! position where it was, so the next cycle fetches the same message again.
//!
//! Cancellation is observed while waiting for a message and during backoff
//! sleeps. A persist already under way is never interrupted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::decode::decode_order;
use crate::cache::OrderCache;
use crate::config::LogConfig;
use crate::logging::log_order_operation;
use crate::messaging::{LogMessage, OrderLog};
use crate::repository::OrderRepository;
use crate::validation::validate_order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Pause after a failed fetch
    pub fetch_backoff: Duration,
    /// Pause after a failed persist, before the same message is fetched again
    pub persist_retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_backoff: Duration::from_millis(500),
            persist_retry_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&LogConfig> for PipelineConfig {
    fn from(config: &LogConfig) -> Self {
        Self {
            fetch_backoff: config.fetch_backoff(),
            persist_retry_backoff: config.persist_retry_backoff(),
        }
    }
}

/// Why a message was committed without being stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Payload did not decode into an order
    Malformed,
    /// Order decoded but failed validation
    Invalid,
}

/// Result of one [`IngestionPipeline::process_next`] cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Order stored, cached and its position committed
    Committed { offset: i64, order_uid: String },
    /// Message unusable; position committed past it
    Skipped { offset: i64, reason: SkipReason },
    /// Store rejected the order; position left in place for a retry
    PersistFailed { offset: i64 },
    /// Order handled but the position could not be committed; the message
    /// will be fetched and applied again
    CommitFailed { offset: i64 },
    /// The log could not be read
    FetchFailed,
    /// Cancellation observed
    Shutdown,
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    fetched: AtomicU64,
    committed: AtomicU64,
    skipped_malformed: AtomicU64,
    skipped_invalid: AtomicU64,
    persist_failures: AtomicU64,
    commit_failures: AtomicU64,
    fetch_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub fetched: u64,
    pub committed: u64,
    pub skipped_malformed: u64,
    pub skipped_invalid: u64,
    pub persist_failures: u64,
    pub commit_failures: u64,
    pub fetch_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            skipped_malformed: self.skipped_malformed.load(Ordering::Relaxed),
            skipped_invalid: self.skipped_invalid.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct IngestionPipeline {
    log: Arc<dyn OrderLog>,
    repository: Arc<dyn OrderRepository>,
    cache: Arc<OrderCache>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
}

impl IngestionPipeline {
    pub fn new(
        log: Arc<dyn OrderLog>,
        repository: Arc<dyn OrderRepository>,
        cache: Arc<OrderCache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            log,
            repository,
            cache,
            config,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run the loop on its own task until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Process messages until `cancel` fires
    #[instrument(skip_all)]
    pub async fn run(&self, cancel: CancellationToken) {
        info!("🚀 Ingestion pipeline started");
        while !cancel.is_cancelled() {
            if self.process_next(&cancel).await == CycleOutcome::Shutdown {
                break;
            }
        }
        info!(stats = ?self.stats.snapshot(), "🛑 Ingestion pipeline stopped");
    }

    /// Carry exactly one message through the pipeline
    pub async fn process_next(&self, cancel: &CancellationToken) -> CycleOutcome {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CycleOutcome::Shutdown,
            result = self.log.fetch() => result,
        };

        let message = match fetched {
            Ok(message) => message,
            Err(e) if !e.is_transient() => {
                debug!(error = %e, "Order log closed");
                return CycleOutcome::Shutdown;
            }
            Err(e) => {
                PipelineStats::bump(&self.stats.fetch_failures);
                warn!(error = %e, backoff_ms = self.config.fetch_backoff.as_millis() as u64, "Order log fetch failed, backing off");
                pause(self.config.fetch_backoff, cancel).await;
                return CycleOutcome::FetchFailed;
            }
        };
        PipelineStats::bump(&self.stats.fetched);

        self.handle_message(&message, cancel).await
    }

    #[instrument(skip_all, fields(offset = message.offset, delivery_count = message.delivery_count))]
    async fn handle_message(&self, message: &LogMessage, cancel: &CancellationToken) -> CycleOutcome {
        let order = match decode_order(&message.payload) {
            Ok(order) => order,
            Err(e) => {
                PipelineStats::bump(&self.stats.skipped_malformed);
                warn!(
                    key = message.key.as_deref(),
                    error = %e,
                    "Skipping malformed message"
                );
                return self.commit_skip(message, SkipReason::Malformed).await;
            }
        };

        if let Err(violations) = validate_order(&order) {
            PipelineStats::bump(&self.stats.skipped_invalid);
            warn!(
                order_uid = %order.order_uid,
                violation_count = violations.len(),
                violations = %violations,
                "Skipping invalid order"
            );
            return self.commit_skip(message, SkipReason::Invalid).await;
        }

        if let Err(e) = self.repository.upsert_order(&order).await {
            PipelineStats::bump(&self.stats.persist_failures);
            error!(
                order_uid = %order.order_uid,
                error = %e,
                "Failed to persist order, position left for retry"
            );
            pause(self.config.persist_retry_backoff, cancel).await;
            return CycleOutcome::PersistFailed {
                offset: message.offset,
            };
        }

        let order_uid = order.order_uid.clone();
        self.cache.set(order_uid.clone(), order.normalized());

        if let Err(e) = self.log.commit(message).await {
            PipelineStats::bump(&self.stats.commit_failures);
            error!(
                order_uid = %order_uid,
                error = %e,
                "Order stored but commit failed, it will be applied again"
            );
            return CycleOutcome::CommitFailed {
                offset: message.offset,
            };
        }

        PipelineStats::bump(&self.stats.committed);
        log_order_operation(
            "ingest",
            Some(&order_uid),
            Some(message.offset),
            "committed",
            None,
        );
        CycleOutcome::Committed {
            offset: message.offset,
            order_uid,
        }
    }

    async fn commit_skip(&self, message: &LogMessage, reason: SkipReason) -> CycleOutcome {
        if let Err(e) = self.log.commit(message).await {
            PipelineStats::bump(&self.stats.commit_failures);
            error!(error = %e, ?reason, "Failed to commit past skipped message");
            return CycleOutcome::CommitFailed {
                offset: message.offset,
            };
        }
        debug!(?reason, "Committed past skipped message");
        CycleOutcome::Skipped {
            offset: message.offset,
            reason,
        }
    }
}

/// Sleep for `duration` unless cancelled first
async fn pause(duration: Duration, cancel: &CancellationToken) {
    if duration.is_zero() {
        return;
    }
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryOrderLog;
    use crate::models::factories;
    use crate::repository::InMemoryOrderRepository;

    struct Harness {
        log: Arc<InMemoryOrderLog>,
        repository: Arc<InMemoryOrderRepository>,
        cache: Arc<OrderCache>,
        pipeline: IngestionPipeline,
    }

    fn harness() -> Harness {
        let log = Arc::new(InMemoryOrderLog::new());
        let repository = Arc::new(InMemoryOrderRepository::new());
        let cache = Arc::new(OrderCache::new(Duration::from_secs(60), 100));
        let pipeline = IngestionPipeline::new(
            log.clone(),
            repository.clone(),
            cache.clone(),
            PipelineConfig {
                fetch_backoff: Duration::from_millis(1),
                persist_retry_backoff: Duration::ZERO,
            },
        );
        Harness {
            log,
            repository,
            cache,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_valid_order_is_stored_cached_and_committed() {
        let h = harness();
        let cancel = CancellationToken::new();
        let order = factories::valid_order("order-valid-1");
        h.log.append_json(Some(order.order_uid.clone()), &order).unwrap();

        let outcome = h.pipeline.process_next(&cancel).await;

        assert_eq!(
            outcome,
            CycleOutcome::Committed {
                offset: 0,
                order_uid: "order-valid-1".to_string()
            }
        );
        assert!(h.repository.stored("order-valid-1").is_some());
        assert!(h.cache.get("order-valid-1").is_some());
        assert_eq!(h.log.committed_offset(), 1);
        assert_eq!(h.pipeline.stats().snapshot().committed, 1);
    }

    #[tokio::test]
    async fn test_cached_order_matches_stored_precision() {
        let h = harness();
        let cancel = CancellationToken::new();
        let mut order = factories::valid_order("order-precise-1");
        order.date_created += chrono::Duration::nanoseconds(123_456_789);
        order.items.reverse();
        h.log.append_json(None, &order).unwrap();

        assert!(matches!(
            h.pipeline.process_next(&cancel).await,
            CycleOutcome::Committed { .. }
        ));

        let cached = h.cache.get("order-precise-1").unwrap();
        assert_eq!(cached.date_created.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(Some(cached), h.repository.stored("order-precise-1"));
    }

    #[tokio::test]
    async fn test_closed_log_reports_shutdown() {
        let h = harness();
        h.log.close();

        assert_eq!(
            h.pipeline.process_next(&CancellationToken::new()).await,
            CycleOutcome::Shutdown
        );
        assert_eq!(h.pipeline.stats().snapshot().fetch_failures, 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_fetch() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(h.pipeline.process_next(&cancel).await, CycleOutcome::Shutdown);
        assert_eq!(h.pipeline.stats().snapshot().fetched, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_after_persist_refetches_same_message() {
        let h = harness();
        let cancel = CancellationToken::new();
        let order = factories::valid_order("order-commit-1");
        h.log.append_json(None, &order).unwrap();
        h.log.fail_next_commits(1);

        assert_eq!(
            h.pipeline.process_next(&cancel).await,
            CycleOutcome::CommitFailed { offset: 0 }
        );
        assert!(matches!(
            h.pipeline.process_next(&cancel).await,
            CycleOutcome::Committed { offset: 0, .. }
        ));
        assert_eq!(h.repository.upsert_calls(), 2);
        assert_eq!(h.log.delivery_count(0), 2);

        let stats = h.pipeline.stats().snapshot();
        assert_eq!(stats.commit_failures, 1);
        assert_eq!(stats.committed, 1);
    }
}
