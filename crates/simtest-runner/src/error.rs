//! Error types for simtest-runner

use thiserror::Error;

/// Runner error type
#[derive(Debug, Error)]
pub enum Error {
    /// Suite file could not be parsed
    #[error("suite parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Suite file parsed but is not runnable
    #[error("invalid suite: {0}")]
    InvalidSuite(String),

    /// Report or suite file IO failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization failed
    #[error("report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
