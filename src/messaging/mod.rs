//! # Messaging Module
//!
//! The durable, ordered log that orders arrive on.
//!
//! Consumption follows commit-after-success: a message fetched but not
//! committed is served again on the next fetch, so the consumer position only
//! moves forward once the caller has finished with a message. Delivery is
//! therefore at-least-once, and consumers must apply messages idempotently.

pub mod errors;
pub mod in_memory_log;
pub mod pgmq_log;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use errors::{LogError, LogResult};
pub use in_memory_log::InMemoryOrderLog;
pub use pgmq_log::PgmqOrderLog;

/// One record read from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Position of the message in the log
    pub offset: i64,
    /// Partitioning key, normally the order id
    pub key: Option<String>,
    /// Raw message body
    pub payload: Vec<u8>,
    /// How many times this message has been handed out, including this one
    pub delivery_count: i32,
    pub enqueued_at: DateTime<Utc>,
}

/// Ordered log with an explicit commit position
#[async_trait]
pub trait OrderLog: Send + Sync + std::fmt::Debug {
    /// Wait for the message at the current position.
    ///
    /// Returns the same message again until it is committed.
    async fn fetch(&self) -> LogResult<LogMessage>;

    /// Advance the position past `message`
    async fn commit(&self, message: &LogMessage) -> LogResult<()>;
}
