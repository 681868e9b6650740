//! Background console reader
//!
//! One task per session. It drains the transport continuously so peripheral
//! output is never dropped while a caller is blocked inside a command send,
//! and routes each line by its classification: prompt/response events to the
//! command channel, peripheral lines to the stream registry, simulator log
//! lines to tracing.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use simtest_proto::{ConsoleLine, LogLevel};

use crate::session::SessionShared;
use crate::stream::StreamSet;
use crate::transport::ReadHalf;

/// Prompt or response line, forwarded to the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConsoleEvent {
    /// Monitor prompt: acknowledges the in-flight command
    Prompt(String),
    /// Synchronous response text
    Response(String),
}

pub(crate) async fn run_reader(
    reader: ReadHalf,
    streams: StreamSet,
    events: mpsc::UnboundedSender<ConsoleEvent>,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Console reader cancelled");
                break;
            }
            next = lines.next_line() => match next {
                Ok(Some(raw)) => route_line(&raw, &streams, &events),
                Ok(None) => {
                    info!("Console closed the connection");
                    shared.mark_dead("console closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Console read failed");
                    shared.mark_dead(&format!("console read failed: {}", e));
                    break;
                }
            }
        }
    }
    // Dropping `events` here closes the channel; the next send observes
    // ChannelError instead of hanging on a dead transport.
}

fn route_line(
    raw: &str,
    streams: &StreamSet,
    events: &mpsc::UnboundedSender<ConsoleEvent>,
) {
    match ConsoleLine::classify(raw) {
        ConsoleLine::Prompt { name } => {
            let _ = events.send(ConsoleEvent::Prompt(name));
        }
        ConsoleLine::Response { text } => {
            let _ = events.send(ConsoleEvent::Response(text));
        }
        ConsoleLine::Stream { stream, text } => {
            trace!(stream = %stream, line = %text, "Peripheral output");
            streams.get_or_create(&stream).push(text);
        }
        ConsoleLine::Log { level, text } => match level {
            LogLevel::Noisy | LogLevel::Debug => debug!(target: "simulator", "{}", text),
            LogLevel::Info => info!(target: "simulator", "{}", text),
            LogLevel::Warning => warn!(target: "simulator", "{}", text),
            LogLevel::Error => error!(target: "simulator", "{}", text),
        },
    }
}
