//! Unified error types for Remindr.

use thiserror::Error;

/// Result type alias using RemindrError.
pub type Result<T> = std::result::Result<T, RemindrError>;

#[derive(Error, Debug)]
pub enum RemindrError {
    // Reminder pipeline errors
    #[error("Selection error: {0}")]
    Selection(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Ledger write error: {0}")]
    Ledger(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Channel errors
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Channel not ready: {0}")]
    ChannelNotReady(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl RemindrError {
    pub fn selection(msg: impl Into<String>) -> Self {
        Self::Selection(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
