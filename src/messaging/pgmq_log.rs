//! # PGMQ Order Log
//!
//! Order log backed by a PostgreSQL message queue (the `pgmq` extension),
//! driven through its SQL functions.
//!
//! `pgmq.read` hides a message for a visibility timeout instead of moving a
//! cursor. To keep the log's position semantics, the message handed out last
//! is remembered until it is committed: the next fetch re-serves it and
//! extends its visibility with `pgmq.set_vt`. Commit archives the message, so
//! processed orders stay inspectable in the queue's archive table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{LogError, LogMessage, LogResult, OrderLog};
use crate::config::LogConfig;

#[derive(Debug)]
pub struct PgmqOrderLog {
    pool: PgPool,
    queue_name: String,
    consumer_group: String,
    visibility_timeout_seconds: i32,
    poll_interval: Duration,
    in_flight: Mutex<Option<LogMessage>>,
}

impl PgmqOrderLog {
    pub fn new(pool: PgPool, config: &LogConfig) -> Self {
        Self {
            pool,
            queue_name: config.queue_name.clone(),
            consumer_group: config.consumer_group.clone(),
            visibility_timeout_seconds: i32::try_from(config.visibility_timeout_seconds)
                .unwrap_or(i32::MAX)
                .max(1),
            poll_interval: config.poll_interval(),
            in_flight: Mutex::new(None),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Create the pgmq extension and the queue if they do not exist yet
    #[instrument(skip(self), fields(queue = %self.queue_name))]
    pub async fn ensure_queue(&self) -> LogResult<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS pgmq")
            .execute(&self.pool)
            .await
            .map_err(LogError::database("create pgmq extension"))?;
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await
            .map_err(LogError::database("create queue"))?;
        info!(queue = %self.queue_name, "📬 Order queue ready");
        Ok(())
    }

    /// Enqueue a JSON payload, returning its message id
    #[instrument(skip(self, payload), fields(queue = %self.queue_name))]
    pub async fn publish(&self, payload: &Value) -> LogResult<i64> {
        let row = sqlx::query("SELECT pgmq.send($1, $2) AS msg_id")
            .bind(&self.queue_name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await
            .map_err(LogError::database("send message"))?;
        let msg_id: i64 = row
            .try_get("msg_id")
            .map_err(LogError::database("send message"))?;
        debug!(msg_id, "📤 Message published");
        Ok(msg_id)
    }

    /// Extend the hidden window of an in-flight message; `false` when the
    /// message no longer exists in the queue
    async fn extend_visibility(&self, msg_id: i64) -> LogResult<bool> {
        let row = sqlx::query("SELECT msg_id FROM pgmq.set_vt($1, $2, $3)")
            .bind(&self.queue_name)
            .bind(msg_id)
            .bind(self.visibility_timeout_seconds)
            .fetch_optional(&self.pool)
            .await
            .map_err(LogError::database("extend visibility"))?;
        Ok(row.is_some())
    }

    async fn read_one(&self) -> LogResult<Option<LogMessage>> {
        let row = sqlx::query(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, 1)",
        )
        .bind(&self.queue_name)
        .bind(self.visibility_timeout_seconds)
        .fetch_optional(&self.pool)
        .await
        .map_err(LogError::database("read message"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let offset: i64 = row.try_get("msg_id").map_err(LogError::database("decode message"))?;
        let delivery_count: i32 = row.try_get("read_ct").map_err(LogError::database("decode message"))?;
        let enqueued_at: DateTime<Utc> = row
            .try_get("enqueued_at")
            .map_err(LogError::database("decode message"))?;
        let body: Value = row.try_get("message").map_err(LogError::database("decode message"))?;

        let key = body
            .get("order_uid")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let payload = serde_json::to_vec(&body)
            .map_err(|e| LogError::Unavailable(format!("re-encoding message {offset}: {e}")))?;

        Ok(Some(LogMessage {
            offset,
            key,
            payload,
            delivery_count,
            enqueued_at,
        }))
    }
}

#[async_trait]
impl OrderLog for PgmqOrderLog {
    async fn fetch(&self) -> LogResult<LogMessage> {
        let mut in_flight = self.in_flight.lock().await;

        if let Some(message) = in_flight.as_mut() {
            if self.extend_visibility(message.offset).await? {
                message.delivery_count += 1;
                debug!(
                    offset = message.offset,
                    delivery_count = message.delivery_count,
                    "🔁 Re-serving uncommitted message"
                );
                return Ok(message.clone());
            }
            warn!(
                offset = message.offset,
                queue = %self.queue_name,
                "In-flight message vanished from the queue, moving on"
            );
            *in_flight = None;
        }

        loop {
            if let Some(message) = self.read_one().await? {
                debug!(
                    offset = message.offset,
                    delivery_count = message.delivery_count,
                    consumer_group = %self.consumer_group,
                    "📨 Message fetched"
                );
                *in_flight = Some(message.clone());
                return Ok(message);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    #[instrument(skip(self, message), fields(queue = %self.queue_name, offset = message.offset))]
    async fn commit(&self, message: &LogMessage) -> LogResult<()> {
        let archived: bool = sqlx::query_scalar("SELECT pgmq.archive($1, $2::BIGINT)")
            .bind(&self.queue_name)
            .bind(message.offset)
            .fetch_one(&self.pool)
            .await
            .map_err(LogError::database("archive message"))?;

        let mut in_flight = self.in_flight.lock().await;
        if in_flight.as_ref().map(|m| m.offset) == Some(message.offset) {
            *in_flight = None;
        }

        if !archived {
            return Err(LogError::Commit {
                offset: message.offset,
                message: "message not found in queue".to_string(),
            });
        }

        debug!("📦 Message archived");
        Ok(())
    }
}
