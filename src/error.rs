//! Error types for the order stream service.
//!

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::LogError;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum OrderStreamError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Migration error: {0}")]
    MigrationError(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] LogError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl From<serde_json::Error> for OrderStreamError {
    fn from(error: serde_json::Error) -> Self {
        OrderStreamError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<sqlx::Error> for OrderStreamError {
    fn from(err: sqlx::Error) -> Self {
        OrderStreamError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for OrderStreamError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        OrderStreamError::MigrationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrderStreamError>;
