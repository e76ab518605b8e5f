//! Error types for the log stream
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using LogError
pub type Result<T> = std::result::Result<T, LogError>;

/// Unified error type for log stream and partition operations
#[derive(Debug, Error)]
pub enum LogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Write Buffer Errors
    // -------------------------------------------------------------------------
    #[error("Write buffer backpressure: requested {requested} bytes, {available} bytes available")]
    Backpressure { requested: usize, available: usize },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Truncation Errors
    // -------------------------------------------------------------------------
    #[error("Can't truncate position {position} which is already committed (commit position {commit_position})")]
    CommittedPositionViolation { position: i64, commit_position: i64 },

    #[error("Truncation failed! Position {0} was not found")]
    PositionNotFound(i64),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage fault: {0}")]
    StorageFault(String),

    #[error("Log corruption detected at address {address}: {reason}")]
    Corruption { address: u64, reason: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Partition Errors
    // -------------------------------------------------------------------------
    #[error("Transition to {requested} on partition {partition_id} rejected: another transition is in progress")]
    TransitionInProgress { partition_id: u32, requested: String },

    #[error("Failed to install stream processor on partition {partition_id}: {reason}")]
    TransitionFailed { partition_id: u32, reason: String },

    #[error("Stream processor error: {0}")]
    Processor(String),
}

impl LogError {
    /// Whether the caller is expected to retry the operation (after backoff)
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogError::Backpressure { .. })
    }
}

impl From<bincode::Error> for LogError {
    fn from(err: bincode::Error) -> Self {
        LogError::Serialization(err.to_string())
    }
}

// Every joiner of a completion handle gets its own copy of the error.
// io::Error is rebuilt from its kind and message.
impl Clone for LogError {
    fn clone(&self) -> Self {
        match self {
            LogError::Io(e) => LogError::Io(std::io::Error::new(e.kind(), e.to_string())),
            LogError::Backpressure {
                requested,
                available,
            } => LogError::Backpressure {
                requested: *requested,
                available: *available,
            },
            LogError::Cancelled(msg) => LogError::Cancelled(msg.clone()),
            LogError::InvalidState(msg) => LogError::InvalidState(msg.clone()),
            LogError::InvalidArgument(msg) => LogError::InvalidArgument(msg.clone()),
            LogError::CommittedPositionViolation {
                position,
                commit_position,
            } => LogError::CommittedPositionViolation {
                position: *position,
                commit_position: *commit_position,
            },
            LogError::PositionNotFound(position) => LogError::PositionNotFound(*position),
            LogError::StorageFault(msg) => LogError::StorageFault(msg.clone()),
            LogError::Corruption { address, reason } => LogError::Corruption {
                address: *address,
                reason: reason.clone(),
            },
            LogError::Serialization(msg) => LogError::Serialization(msg.clone()),
            LogError::Config(msg) => LogError::Config(msg.clone()),
            LogError::TransitionInProgress {
                partition_id,
                requested,
            } => LogError::TransitionInProgress {
                partition_id: *partition_id,
                requested: requested.clone(),
            },
            LogError::TransitionFailed {
                partition_id,
                reason,
            } => LogError::TransitionFailed {
                partition_id: *partition_id,
                reason: reason.clone(),
            },
            LogError::Processor(msg) => LogError::Processor(msg.clone()),
        }
    }
}
