//! Simtest Client - driving a simulator through its console
//!
//! This crate owns the connection side of simtest:
//! - Session: lifecycle of one simulator connection (connect, liveness,
//!   restart, shutdown)
//! - Channel: serialized command delivery with prompt acknowledgment
//! - Stream: append-only peripheral output logs and blocking matchers
//! - Transport: spawned-process or TCP console endpoints
//!
//! Simulator internals stay on the far side of the console protocol; this
//! crate only ever sends monitor text and classifies what comes back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod config;
pub mod error;
mod reader;
pub mod session;
pub mod stream;
pub mod transport;

pub use channel::{CommandChannel, CommandOutcome};
pub use config::{Endpoint, SessionConfig};
pub use error::{Error, Result};
pub use session::{Session, SessionStatus};
pub use stream::{OutputStream, StreamMatcher, DEFAULT_TAIL_LINES};
pub use transport::Transport;
