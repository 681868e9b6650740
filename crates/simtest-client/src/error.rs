//! Error types for simtest-client

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum Error {
    /// Simulator could not be started or reached
    #[error("connect failed: {0}")]
    Connect(String),

    /// Transport severed or console unresponsive mid-session
    #[error("channel error: {0}")]
    Channel(String),

    /// Expected output never appeared on a stream
    #[error("wait for {pattern:?} on '{stream}' timed out after {timeout_ms}ms")]
    MatchTimeout {
        /// Stream the matcher was watching
        stream: String,
        /// The literal line or prompt suffix waited for
        pattern: String,
        /// Configured timeout in milliseconds
        timeout_ms: u64,
        /// Last lines observed on the stream, for diagnosis
        tail: Vec<String>,
    },

    /// Wait aborted by an external cancellation signal
    #[error("wait cancelled")]
    Cancelled,

    /// Console rejected a command (typed by command kind)
    #[error(transparent)]
    Protocol(#[from] simtest_proto::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
