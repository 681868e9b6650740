//! Command Channel - serialized command delivery with prompt acknowledgment
//!
//! All commands for one session funnel through a single async mutex, so two
//! commands' bytes can never interleave on the wire and at most one command
//! is in flight at a time. A command's response window is everything the
//! reader classified as response text up to the next prompt.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use simtest_proto::ConsoleCommand;

use crate::error::{Error, Result};
use crate::reader::ConsoleEvent;
use crate::transport::WriteHalf;

/// Result of a synchronously acknowledged command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Response lines observed before the prompt
    pub lines: Vec<String>,
    /// Name inside the acknowledging prompt
    pub prompt: String,
}

struct ChannelInner {
    writer: WriteHalf,
    events: mpsc::UnboundedReceiver<ConsoleEvent>,
    /// Encoded text of a fire-and-forget command whose ack is still owed.
    pending: Option<String>,
}

/// Serialized command path to one console.
pub struct CommandChannel {
    inner: Mutex<ChannelInner>,
    ack_timeout: Duration,
}

impl CommandChannel {
    pub(crate) fn new(
        writer: WriteHalf,
        events: mpsc::UnboundedReceiver<ConsoleEvent>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                writer,
                events,
                pending: None,
            }),
            ack_timeout,
        }
    }

    /// Send a command and wait for its prompt acknowledgment.
    ///
    /// Returns the command's response lines; a console failure report in
    /// those lines becomes the typed error for the command's kind.
    pub async fn execute(&self, command: &ConsoleCommand) -> Result<CommandOutcome> {
        self.execute_with_timeout(command, self.ack_timeout).await
    }

    /// [`execute`](Self::execute) with an explicit acknowledgment bound
    /// (used by the liveness probe).
    pub async fn execute_with_timeout(
        &self,
        command: &ConsoleCommand,
        ack_timeout: Duration,
    ) -> Result<CommandOutcome> {
        let mut inner = self.inner.lock().await;
        drain_pending(&mut inner, self.ack_timeout).await?;
        write_line(&mut inner.writer, &command.encode()).await?;
        let outcome = collect_ack(&mut inner.events, ack_timeout).await?;
        command.check_response(&outcome.lines)?;
        Ok(outcome)
    }

    /// Send a command without waiting for its acknowledgment.
    ///
    /// The ack is still owed on the wire; the next channel operation drains
    /// it first, which is what keeps commands serialized even for
    /// fire-and-forget sends.
    pub async fn send(&self, command: &ConsoleCommand) -> Result<()> {
        let mut inner = self.inner.lock().await;
        drain_pending(&mut inner, self.ack_timeout).await?;
        let encoded = command.encode();
        write_line(&mut inner.writer, &encoded).await?;
        inner.pending = Some(encoded);
        Ok(())
    }

    /// Wait for the console's first prompt after connecting.
    pub(crate) async fn await_prompt(&self, timeout: Duration) -> Result<CommandOutcome> {
        let mut inner = self.inner.lock().await;
        collect_ack(&mut inner.events, timeout).await
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}

async fn drain_pending(inner: &mut ChannelInner, ack_timeout: Duration) -> Result<()> {
    if let Some(sent) = inner.pending.take() {
        let outcome = collect_ack(&mut inner.events, ack_timeout).await?;
        if !outcome.lines.is_empty() {
            debug!(command = %sent, lines = outcome.lines.len(), "Late response to unacknowledged command");
        }
    }
    Ok(())
}

async fn write_line(writer: &mut WriteHalf, line: &str) -> Result<()> {
    let severed = |e: std::io::Error| Error::Channel(format!("console write failed: {}", e));
    writer.write_all(line.as_bytes()).await.map_err(severed)?;
    writer.write_all(b"\n").await.map_err(severed)?;
    writer.flush().await.map_err(severed)?;
    Ok(())
}

async fn collect_ack(
    events: &mut mpsc::UnboundedReceiver<ConsoleEvent>,
    ack_timeout: Duration,
) -> Result<CommandOutcome> {
    let deadline = tokio::time::Instant::now() + ack_timeout;
    let mut lines = Vec::new();
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| Error::Channel("command acknowledgment timed out".to_string()))?;
        match event {
            Some(ConsoleEvent::Prompt(prompt)) => return Ok(CommandOutcome { lines, prompt }),
            Some(ConsoleEvent::Response(text)) => lines.push(text),
            None => return Err(Error::Channel("console connection closed".to_string())),
        }
    }
}
