//! # Log Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log unavailable: {0}")]
    Unavailable(String),

    #[error("Log fetch cancelled")]
    Cancelled,

    #[error("Commit failed for offset {offset}: {message}")]
    Commit { offset: i64, message: String },

    #[error("Log database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        source: sqlx::Error,
    },
}

impl LogError {
    pub(crate) fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| LogError::Database { operation, source }
    }

    /// Whether retrying the same call later can succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, LogError::Cancelled)
    }
}

pub type LogResult<T> = Result<T, LogError>;
