//! Session - lifecycle of one connection to a simulator console
//!
//! A `Session` owns the transport, the background reader task, the command
//! channel and the stream registry for one simulator instance. Sessions are
//! explicit handles: there is no process-wide simulator singleton, and any
//! number of sessions run independently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use simtest_proto::ConsoleCommand;

use crate::channel::{CommandChannel, CommandOutcome};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::reader::run_reader;
use crate::stream::{OutputStream, StreamMatcher, StreamSet};
use crate::transport::Transport;

/// Command issued by the liveness probe; any acknowledged response counts.
const PROBE_COMMAND: &str = "version";

/// Bound on the best-effort `quit` during shutdown.
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Transport is up and the console was responsive last we checked
    Connected,
    /// The liveness probe went unanswered; `restart` is the way out
    Hung,
    /// Shut down, or the console closed the connection
    Closed,
}

/// State shared with the background reader task.
pub(crate) struct SessionShared {
    alive: AtomicBool,
    hung: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            hung: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub(crate) fn mark_dead(&self, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        self.set_last_error(reason);
    }

    fn set_last_error(&self, message: &str) {
        *self.last_error.lock().expect("last_error lock poisoned") = Some(message.to_string());
    }
}

/// One running simulator connection.
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    channel: CommandChannel,
    streams: StreamSet,
    shared: Arc<SessionShared>,
    reader_task: Option<JoinHandle<()>>,
    child: Option<Child>,
    cancel: CancellationToken,
    closed: bool,
}

impl Session {
    /// Start (or reach) the simulator and wait for its first prompt.
    ///
    /// Fails with [`Error::Connect`] within the configured connect timeout;
    /// on failure no session exists and any spawned process is killed.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let transport = Transport::connect(&config.endpoint, config.connect_timeout()).await?;
        Self::attach(config, transport).await
    }

    /// Attach to an already-established console transport.
    pub async fn attach(config: SessionConfig, transport: Transport) -> Result<Self> {
        let (reader, writer, mut child) = transport.into_parts();
        let streams = StreamSet::new();
        let shared = Arc::new(SessionShared::new());
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(run_reader(
            reader,
            streams.clone(),
            events_tx,
            Arc::clone(&shared),
            cancel.clone(),
        ));
        let channel = CommandChannel::new(writer, events_rx, config.ack_timeout());

        match channel.await_prompt(config.connect_timeout()).await {
            Ok(outcome) => {
                debug!(prompt = %outcome.prompt, "Console is ready");
            }
            Err(e) => {
                cancel.cancel();
                if let Some(c) = child.as_mut() {
                    let _ = c.start_kill();
                }
                return Err(Error::Connect(format!("no console prompt: {}", e)));
            }
        }

        let id = Uuid::new_v4();
        info!(session_id = %id, "Console session established");
        Ok(Self {
            id,
            config,
            channel,
            streams,
            shared,
            reader_task: Some(reader_task),
            child,
            cancel,
            closed: false,
        })
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The configuration this session was built from.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SessionStatus {
        if self.closed || !self.shared.alive.load(Ordering::SeqCst) {
            SessionStatus::Closed
        } else if self.shared.hung.load(Ordering::SeqCst) {
            SessionStatus::Hung
        } else {
            SessionStatus::Connected
        }
    }

    /// Most recent session-level failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .expect("last_error lock poisoned")
            .clone()
    }

    /// Create a named machine and switch the monitor to it.
    pub async fn create_machine(&self, name: &str) -> Result<()> {
        self.run(ConsoleCommand::CreateMachine {
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    /// Load a platform description file into the current machine.
    pub async fn load_platform(&self, path: impl Into<std::path::PathBuf>) -> Result<()> {
        self.run(ConsoleCommand::LoadPlatform { path: path.into() })
            .await
            .map(|_| ())
    }

    /// Load a guest binary; `address_space` defaults to the system bus.
    pub async fn load_binary(
        &self,
        path: impl Into<std::path::PathBuf>,
        address_space: Option<&str>,
    ) -> Result<()> {
        self.run(ConsoleCommand::LoadBinary {
            path: path.into(),
            address_space: address_space.map(str::to_string),
        })
        .await
        .map(|_| ())
    }

    /// Start emulation.
    pub async fn start(&self) -> Result<()> {
        self.run(ConsoleCommand::Start).await.map(|_| ())
    }

    /// Pause emulation. Idempotent on the console side.
    pub async fn pause(&self) -> Result<()> {
        self.run(ConsoleCommand::Pause).await.map(|_| ())
    }

    /// Reset the current machine.
    pub async fn reset(&self) -> Result<()> {
        self.run(ConsoleCommand::Reset).await.map(|_| ())
    }

    /// Write one line of input to a virtual UART. Fire-and-forget.
    pub async fn write_uart(&self, terminal: &str, text: &str) -> Result<()> {
        let command = ConsoleCommand::WriteUart {
            terminal: terminal.to_string(),
            text: text.to_string(),
        };
        debug!(session_id = %self.id, command = %command, "Sending console command");
        let result = self.channel.send(&command).await;
        self.record(result)
    }

    /// Run a verbatim monitor command and return its response lines.
    pub async fn execute_raw(&self, text: &str) -> Result<Vec<String>> {
        self.run(ConsoleCommand::Raw {
            text: text.to_string(),
        })
        .await
        .map(|outcome| outcome.lines)
    }

    /// Handle to a named output stream, created on first reference.
    pub fn stream(&self, name: &str) -> OutputStream {
        self.streams.get_or_create(name)
    }

    /// Names of all streams the console has routed output to so far.
    pub fn stream_names(&self) -> Vec<String> {
        self.streams.names()
    }

    /// Matcher over a named stream, window opening now.
    pub fn matcher(&self, stream: &str) -> StreamMatcher {
        self.stream(stream).matcher_with(self.config.tail_lines, None)
    }

    /// Matcher wired to an external cancellation signal (a test case's).
    pub fn matcher_with_cancel(&self, stream: &str, cancel: CancellationToken) -> StreamMatcher {
        self.stream(stream)
            .matcher_with(self.config.tail_lines, Some(cancel))
    }

    /// Probe the console: issue a trivial command and require its prompt
    /// within the probe timeout. An unanswered probe marks the session hung.
    pub async fn check_liveness(&self) -> Result<()> {
        let probe = ConsoleCommand::Raw {
            text: PROBE_COMMAND.to_string(),
        };
        match self
            .channel
            .execute_with_timeout(&probe, self.config.probe_timeout())
            .await
        {
            Ok(_) => {
                self.shared.hung.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(Error::Channel(msg)) => {
                self.shared.hung.store(true, Ordering::SeqCst);
                self.shared.set_last_error(&msg);
                warn!(session_id = %self.id, error = %msg, "Liveness probe failed");
                Err(Error::Channel(msg))
            }
            // The console answered, just unhappily: it is alive.
            Err(_) => {
                self.shared.hung.store(false, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Terminate the simulator and release resources. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        // Ask the console to exit; a dead console just means we kill below.
        let _ = tokio::time::timeout(QUIT_GRACE, self.channel.execute(&ConsoleCommand::Quit)).await;

        self.cancel.cancel();
        if let Some(task) = self.reader_task.take() {
            let _ = task.await;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.closed = true;
        info!(session_id = %self.id, "Session shut down");
    }

    /// Shutdown followed by a fresh connect with the same configuration.
    ///
    /// The explicit recovery path for a hung session; the client never
    /// restarts on its own.
    pub async fn restart(&mut self) -> Result<()> {
        let old_id = self.id;
        self.shutdown().await;
        let fresh = Self::connect(self.config.clone()).await?;
        *self = fresh;
        info!(old_session_id = %old_id, session_id = %self.id, "Session restarted");
        Ok(())
    }

    async fn run(&self, command: ConsoleCommand) -> Result<CommandOutcome> {
        debug!(session_id = %self.id, command = %command, "Sending console command");
        let result = self.channel.execute(&command).await;
        self.record(result)
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.shared.set_last_error(&e.to_string());
        }
        result
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
