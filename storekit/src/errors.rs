use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cursor exhausted: {0}")]
    ExhaustionError(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Startup failure: {0}")]
    StartupFailure(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout error: operation timed out after {0:?}")]
    TimeoutError(Duration),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<scylla::transport::errors::QueryError> for StoreError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

impl From<scylla::transport::errors::NewSessionError> for StoreError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        StoreError::DatabaseError(format!("Connection failed: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(err: serde_yaml::Error) -> Self {
        StoreError::ConfigError(err.to_string())
    }
}

impl From<config::ConfigError> for StoreError {
    fn from(err: config::ConfigError) -> Self {
        StoreError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unknown(err.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Unknown(err.to_string())
    }
}
