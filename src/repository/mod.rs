//! # Order Repository
//!
//! Persistence for the order aggregate across the `orders`, `deliveries`,
//! `payments` and `items` tables.
//!
//! Writes are full-replace upserts inside a single transaction: header,
//! delivery and payment are overwritten by primary key, and the item set is
//! deleted and reinserted. Replaying the same order any number of times leaves
//! the same stored state, which is what makes at-least-once redelivery safe.
//!
//! Repositories never retry; retry policy belongs to the caller.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Order;

pub use in_memory::InMemoryOrderRepository;
pub use postgres::PgOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        source: sqlx::Error,
    },

    #[error("Order {order_uid} cannot be stored: {reason}")]
    InvalidAggregate { order_uid: String, reason: String },

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Adapter for `map_err` that tags a sqlx error with the failed operation
    pub(crate) fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| RepositoryError::Database { operation, source }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Transactional access to stored orders
#[async_trait]
pub trait OrderRepository: Send + Sync + std::fmt::Debug {
    /// Insert or fully replace the aggregate in one transaction
    async fn upsert_order(&self, order: &Order) -> RepositoryResult<()>;

    /// Read one aggregate; `Ok(None)` when no header row exists
    async fn get_order(&self, order_uid: &str) -> RepositoryResult<Option<Order>>;

    /// Read every stored aggregate, used to warm the cache at startup
    async fn load_all_orders(&self) -> RepositoryResult<Vec<Order>>;
}
