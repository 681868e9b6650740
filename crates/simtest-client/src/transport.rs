//! Transport - the raw byte connection to the simulator console
//!
//! Two endpoints: a spawned simulator process (piped stdio) or a TCP monitor
//! socket. Both reduce to an `AsyncRead` half consumed by the background
//! reader task and an `AsyncWrite` half owned by the command channel.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::config::Endpoint;
use crate::error::{Error, Result};

/// Boxed read half of a console connection.
pub type ReadHalf = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half of a console connection.
pub type WriteHalf = Box<dyn AsyncWrite + Send + Unpin>;

/// An established console connection, not yet attached to a session.
pub struct Transport {
    reader: ReadHalf,
    writer: WriteHalf,
    child: Option<Child>,
}

impl Transport {
    /// Establish a connection to the given endpoint within `timeout`.
    ///
    /// Fails with [`Error::Connect`] if the process cannot be spawned or the
    /// socket cannot be reached in time. Waiting for the initial prompt is
    /// the session's job, not the transport's.
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        match endpoint {
            Endpoint::Spawn { program, args } => {
                debug!(program = %program, "Spawning simulator process");
                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| Error::Connect(format!("spawn '{}': {}", program, e)))?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| Error::Connect("child stdin not captured".to_string()))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| Error::Connect("child stdout not captured".to_string()))?;
                Ok(Self {
                    reader: Box::new(stdout),
                    writer: Box::new(stdin),
                    child: Some(child),
                })
            }
            Endpoint::Tcp { address } => {
                debug!(address = %address, "Connecting to monitor socket");
                let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
                    .await
                    .map_err(|_| {
                        Error::Connect(format!("connect to {} timed out", address))
                    })?
                    .map_err(|e| Error::Connect(format!("connect to {}: {}", address, e)))?;
                let (read, write) = stream.into_split();
                Ok(Self {
                    reader: Box::new(read),
                    writer: Box::new(write),
                    child: None,
                })
            }
        }
    }

    /// Wrap an already-established IO pair (pre-spawned simulator, tests).
    pub fn from_io(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        }
    }

    pub(crate) fn into_parts(self) -> (ReadHalf, WriteHalf, Option<Child>) {
        (self.reader, self.writer, self.child)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("child", &self.child.as_ref().map(|c| c.id()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_unreachable_tcp_is_connect_error() {
        // Reserved TEST-NET-1 address: connection will fail or time out.
        let endpoint = Endpoint::Tcp {
            address: "192.0.2.1:9".to_string(),
        };
        let started = std::time::Instant::now();
        let result = Transport::connect(&endpoint, Duration::from_millis(200)).await;
        match result {
            Err(Error::Connect(_)) => {}
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        // Bounded by the configured timeout, with scheduling slack.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connect_missing_program_is_connect_error() {
        let endpoint = Endpoint::Spawn {
            program: "/nonexistent/simulator-binary".to_string(),
            args: Vec::new(),
        };
        let result = Transport::connect(&endpoint, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }
}
