//! Error types for EntityKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using EntityKvError
pub type Result<T> = std::result::Result<T, EntityKvError>;

/// Unified error type for EntityKV operations
#[derive(Debug, Error)]
pub enum EntityKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Caller Errors (raised before any backend call)
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Entity of type {type_name} has no id")]
    MissingId { type_name: &'static str },

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    /// Error reported by the key-value store itself (e.g. WRONGTYPE)
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Snapshot corrupted: {0}")]
    SnapshotCorrupted(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
