//! Error types for simtest-proto

use thiserror::Error;

/// Protocol error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Console rejected a platform description load
    #[error("platform load rejected: {0}")]
    PlatformLoad(String),

    /// Console rejected a binary load
    #[error("binary load rejected: {0}")]
    BinaryLoad(String),

    /// Console reported failure for a sent command
    #[error("command failed: {0}")]
    Command(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
