//! Simtest Proto - Console Protocol Codec
//!
//! This crate translates between high-level simulator operations and the
//! monitor's line-oriented text protocol:
//! - Command: High-level operations encoded as monitor command lines
//! - Line: Classification of console output (prompt, stream, log, response)
//!
//! The codec is pure translation; it owns no connection state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod line;

pub use command::{CommandKind, ConsoleCommand};
pub use error::{Error, Result};
pub use line::{ConsoleLine, LogLevel};
