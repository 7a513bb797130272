//! Application error types
//!
//! Transport-level errors (`Connection`, `ProbeTimeout`, `Io`) end a session.
//! `MalformedMessage` is scoped to a single frame and never closes a connection.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("clock moved backwards, refusing to generate id for {millis} milliseconds")]
    ClockRegression { millis: u64 },

    #[error("node id must be between 0 and {max}, got {node_id}")]
    InvalidNodeId { node_id: u64, max: u64 },

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("peer did not acknowledge a liveness probe within {0:?}")]
    ProbeTimeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn internal(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Config(msg.into())
    }

    /// Whether the error ends the whole session rather than a single frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AppError::MalformedMessage(_) | AppError::ClockRegression { .. }
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Connection(err.to_string())
    }
}

impl From<axum::Error> for AppError {
    fn from(err: axum::Error) -> Self {
        AppError::Connection(err.to_string())
    }
}

impl From<::config::ConfigError> for AppError {
    fn from(err: ::config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
