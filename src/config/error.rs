//! Configuration Error Types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A source could not be read or the merged values did not deserialize
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Configuration file named explicitly but missing
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Values deserialized but broke a validation rule
    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn validation_error(error: impl Into<String>) -> Self {
        Self::ValidationError {
            error: error.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ConfigurationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation_error(errors.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
