//! Error types shared across the workspace.

use crate::types::Channel;
use thiserror::Error;

/// Result alias using the sentinel [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound data failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Append to a log failed
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Reading a log failed
    #[error(transparent)]
    Read(#[from] ReadError),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Failure to append a record.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The backing storage rejected the write (disk full, permissions, ...)
    #[error("Storage failure on channel '{channel}': {source}")]
    StorageFailure {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    /// The record cannot be stored as a single line
    #[error("Invalid record for channel '{channel}': {reason}")]
    InvalidRecord { channel: Channel, reason: String },
}

/// Failure to read a log.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Storage exists but could not be opened or read
    #[error("Log '{channel}' unavailable: {source}")]
    LogUnavailable {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    /// A complete line in the log is not a valid record
    #[error("Corrupt record in log '{channel}' at offset {offset}: {source}")]
    Corrupt {
        channel: Channel,
        /// Start of the offending record
        offset: u64,
        #[source]
        source: CorruptRecord,
    },
}

/// Why a stored record could not be decoded
#[derive(Debug, Error)]
pub enum CorruptRecord {
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReadError {
    /// Channel the failed read was against
    pub fn channel(&self) -> Channel {
        match self {
            ReadError::LogUnavailable { channel, .. } | ReadError::Corrupt { channel, .. } => {
                *channel
            }
        }
    }
}
