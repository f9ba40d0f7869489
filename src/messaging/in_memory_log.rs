//! # In-Memory Order Log
//!
//! Ordered in-memory log for tests and local runs. Keeps the same position
//! semantics as the queue-backed log: the message at the committed position is
//! served until it is committed.
//!
//! Failures can be injected per call (`fail_next_fetches`, `fail_next_commits`)
//! to exercise retry paths without a broker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use super::{LogError, LogMessage, LogResult, OrderLog};

#[derive(Debug, Clone)]
struct StoredMessage {
    key: Option<String>,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    delivery_count: i32,
}

#[derive(Debug, Default)]
struct LogState {
    messages: Vec<StoredMessage>,
    committed: usize,
    commits: u64,
    fetch_failures_remaining: u32,
    commit_failures_remaining: u32,
    closed: bool,
}

/// In-memory log for a single consumer
#[derive(Debug, Default)]
pub struct InMemoryOrderLog {
    state: Mutex<LogState>,
    notify: Notify,
}

impl InMemoryOrderLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw payload, returning its offset
    pub fn append(&self, key: Option<String>, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = {
            let mut state = self.state.lock();
            state.messages.push(StoredMessage {
                key,
                payload: payload.into(),
                enqueued_at: Utc::now(),
                delivery_count: 0,
            });
            (state.messages.len() - 1) as i64
        };
        self.notify.notify_one();
        offset
    }

    /// Serialize `value` as JSON and append it
    pub fn append_json<T: Serialize>(
        &self,
        key: Option<String>,
        value: &T,
    ) -> serde_json::Result<i64> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.append(key, payload))
    }

    /// Make pending and future fetches return [`LogError::Cancelled`] once the
    /// log is drained
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn fail_next_fetches(&self, count: u32) {
        self.state.lock().fetch_failures_remaining = count;
    }

    pub fn fail_next_commits(&self, count: u32) {
        self.state.lock().commit_failures_remaining = count;
    }

    /// Offset of the next message to be served
    pub fn committed_offset(&self) -> i64 {
        self.state.lock().committed as i64
    }

    /// Number of successful commits that advanced the position
    pub fn commit_count(&self) -> u64 {
        self.state.lock().commits
    }

    /// Times the message at `offset` has been served
    pub fn delivery_count(&self, offset: i64) -> i32 {
        usize::try_from(offset)
            .ok()
            .and_then(|index| self.state.lock().messages.get(index).map(|m| m.delivery_count))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages appended but not yet committed
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.messages.len() - state.committed
    }

    fn try_fetch(&self) -> Option<LogResult<LogMessage>> {
        let mut state = self.state.lock();

        if state.fetch_failures_remaining > 0 {
            state.fetch_failures_remaining -= 1;
            return Some(Err(LogError::Unavailable(
                "injected fetch failure".to_string(),
            )));
        }

        let offset = state.committed;
        if let Some(stored) = state.messages.get_mut(offset) {
            stored.delivery_count += 1;
            return Some(Ok(LogMessage {
                offset: offset as i64,
                key: stored.key.clone(),
                payload: stored.payload.clone(),
                delivery_count: stored.delivery_count,
                enqueued_at: stored.enqueued_at,
            }));
        }

        if state.closed {
            return Some(Err(LogError::Cancelled));
        }
        None
    }
}

#[async_trait]
impl OrderLog for InMemoryOrderLog {
    async fn fetch(&self) -> LogResult<LogMessage> {
        loop {
            if let Some(result) = self.try_fetch() {
                return result;
            }
            // notify_one stores a permit, so an append between the check and
            // this await is not lost
            self.notify.notified().await;
        }
    }

    async fn commit(&self, message: &LogMessage) -> LogResult<()> {
        let mut state = self.state.lock();

        if state.commit_failures_remaining > 0 {
            state.commit_failures_remaining -= 1;
            return Err(LogError::Commit {
                offset: message.offset,
                message: "injected commit failure".to_string(),
            });
        }

        let committed = state.committed as i64;
        if message.offset < committed {
            // already behind the position, nothing to move
            return Ok(());
        }
        if message.offset > committed {
            return Err(LogError::Commit {
                offset: message.offset,
                message: format!("ahead of committed position {committed}"),
            });
        }

        state.committed += 1;
        state.commits += 1;
        debug!(offset = message.offset, "In-memory log position advanced");
        Ok(())
    }
}
