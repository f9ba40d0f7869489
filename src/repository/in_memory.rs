//! In-memory order repository for tests and local runs.
//!
//! Mirrors the stored-state semantics of the PostgreSQL repository: upserts
//! replace the whole aggregate and reads return items ordered by `chrt_id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{OrderRepository, RepositoryError, RepositoryResult};
use crate::models::Order;

#[derive(Debug, Default)]
struct FailurePlan {
    upserts: u32,
    reads: u32,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<String, Order>>,
    failures: Mutex<FailurePlan>,
    upsert_calls: AtomicU64,
    get_calls: AtomicU64,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `order` directly, bypassing call counters and injected failures
    pub fn seed(&self, order: Order) {
        let order = order.normalized();
        self.orders.lock().insert(order.order_uid.clone(), order);
    }

    /// Make the next `count` upserts fail with [`RepositoryError::Unavailable`]
    pub fn fail_next_upserts(&self, count: u32) {
        self.failures.lock().upserts = count;
    }

    /// Make the next `count` reads (`get_order` or `load_all_orders`) fail
    pub fn fail_next_reads(&self, count: u32) {
        self.failures.lock().reads = count;
    }

    /// Upsert attempts, including failed ones
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    /// `get_order` attempts, including failed ones
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        self.orders.lock().get(order_uid).cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_read_failure(&self) -> RepositoryResult<()> {
        let mut failures = self.failures.lock();
        if failures.reads > 0 {
            failures.reads -= 1;
            return Err(RepositoryError::Unavailable(
                "injected read failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn upsert_order(&self, order: &Order) -> RepositoryResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        {
            let mut failures = self.failures.lock();
            if failures.upserts > 0 {
                failures.upserts -= 1;
                return Err(RepositoryError::Unavailable(
                    "injected upsert failure".to_string(),
                ));
            }
        }

        if order.payment_time().is_none() {
            return Err(RepositoryError::InvalidAggregate {
                order_uid: order.order_uid.clone(),
                reason: format!(
                    "payment_dt {} is not a valid timestamp",
                    order.payment.payment_dt
                ),
            });
        }

        let order = order.normalized();
        self.orders.lock().insert(order.order_uid.clone(), order);
        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> RepositoryResult<Option<Order>> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        self.take_read_failure()?;
        Ok(self.stored(order_uid))
    }

    async fn load_all_orders(&self) -> RepositoryResult<Vec<Order>> {
        self.take_read_failure()?;
        let mut orders: Vec<Order> = self.orders.lock().values().cloned().collect();
        orders.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));
        Ok(orders)
    }
}
