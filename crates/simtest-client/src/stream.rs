//! OutputStream - append-only line log of a virtual peripheral
//!
//! One writer (the session's background reader task), any number of
//! concurrent matchers. Each matcher keeps a private cursor, so delivery to
//! a matcher is in production order and exactly once; a matcher only ever
//! sees lines appended after it was created.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Default diagnostic tail length when none is configured.
pub const DEFAULT_TAIL_LINES: usize = 20;

struct StreamInner {
    name: String,
    lines: Mutex<Vec<String>>,
    len_tx: watch::Sender<usize>,
}

/// A named, append-only, unbounded sequence of output lines.
///
/// Cloning is cheap and shares the underlying log.
#[derive(Clone)]
pub struct OutputStream {
    inner: Arc<StreamInner>,
}

impl OutputStream {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(StreamInner {
                name: name.into(),
                lines: Mutex::new(Vec::new()),
                len_tx,
            }),
        }
    }

    /// Stream name as routed by the console.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append one line. Called only by the session's reader task.
    pub(crate) fn push(&self, line: String) {
        let mut lines = self.inner.lines.lock().expect("stream lock poisoned");
        lines.push(line);
        let len = lines.len();
        drop(lines);
        let _ = self.inner.len_tx.send_replace(len);
    }

    /// Number of lines produced so far.
    pub fn len(&self) -> usize {
        self.inner.lines.lock().expect("stream lock poisoned").len()
    }

    /// True if nothing has been produced yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last `k` lines, oldest first.
    pub fn tail(&self, k: usize) -> Vec<String> {
        let lines = self.inner.lines.lock().expect("stream lock poisoned");
        let start = lines.len().saturating_sub(k);
        lines[start..].to_vec()
    }

    /// Start a matcher whose window opens at the current end of the stream.
    pub fn matcher(&self) -> StreamMatcher {
        self.matcher_with(DEFAULT_TAIL_LINES, None)
    }

    /// Start a matcher with a configured diagnostic tail length and an
    /// optional cancellation signal (typically the owning test case's).
    pub fn matcher_with(&self, tail_lines: usize, cancel: Option<CancellationToken>) -> StreamMatcher {
        let len_rx = self.inner.len_tx.subscribe();
        let cursor = self.len();
        StreamMatcher {
            stream: self.clone(),
            cursor,
            len_rx,
            tail_lines,
            cancel,
        }
    }

    /// First line at or after `from` satisfying `pred`, with its index,
    /// plus the stream length at scan time.
    fn scan(&self, from: usize, pred: impl Fn(&str) -> bool) -> (usize, Option<(usize, String)>) {
        let lines = self.inner.lines.lock().expect("stream lock poisoned");
        for (i, line) in lines.iter().enumerate().skip(from) {
            if pred(line) {
                return (lines.len(), Some((i, line.clone())));
            }
        }
        (lines.len(), None)
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .finish()
    }
}

/// A blocking-wait primitive over one [`OutputStream`].
///
/// The matcher consumes lines as it scans: a line is considered at most once
/// per matcher, and lines produced before the matcher was created are never
/// considered.
pub struct StreamMatcher {
    stream: OutputStream,
    cursor: usize,
    len_rx: watch::Receiver<usize>,
    tail_lines: usize,
    cancel: Option<CancellationToken>,
}

impl StreamMatcher {
    /// Wait until a line equal to `literal` appears, or `timeout` elapses.
    ///
    /// On success returns the matched line and advances past it. On timeout
    /// fails with [`Error::MatchTimeout`] carrying the stream's recent tail;
    /// the wait is terminal either way.
    pub async fn wait_for_line(&mut self, literal: &str, timeout: Duration) -> Result<String> {
        let wanted = literal.to_string();
        self.wait_matching(literal, timeout, move |line| line == wanted)
            .await
    }

    /// Wait until a line ending with `suffix` appears (guest prompt), or
    /// `timeout` elapses.
    pub async fn wait_for_prompt(&mut self, suffix: &str, timeout: Duration) -> Result<String> {
        let wanted = suffix.to_string();
        self.wait_matching(suffix, timeout, move |line| line.ends_with(&wanted))
            .await
    }

    /// The stream this matcher watches.
    pub fn stream(&self) -> &OutputStream {
        &self.stream
    }

    async fn wait_matching(
        &mut self,
        pattern: &str,
        timeout: Duration,
        pred: impl Fn(&str) -> bool,
    ) -> Result<String> {
        enum Wake {
            NewLines,
            WriterGone,
            Cancelled,
            Deadline,
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (len, hit) = self.stream.scan(self.cursor, &pred);
            if let Some((index, line)) = hit {
                self.cursor = index + 1;
                return Ok(line);
            }
            self.cursor = len;

            let wake = {
                let len_rx = &mut self.len_rx;
                let cancel = self.cancel.as_ref();
                tokio::select! {
                    changed = len_rx.changed() => match changed {
                        Ok(()) => Wake::NewLines,
                        Err(_) => Wake::WriterGone,
                    },
                    () = cancelled(cancel) => Wake::Cancelled,
                    () = tokio::time::sleep_until(deadline) => Wake::Deadline,
                }
            };
            match wake {
                Wake::NewLines => {}
                Wake::WriterGone => {
                    // The sender lives inside the stream we hold; if it is
                    // somehow gone, only the deadline can resolve this wait.
                    tokio::time::sleep_until(deadline).await;
                    return Err(self.timeout_error(pattern, timeout));
                }
                Wake::Cancelled => return Err(Error::Cancelled),
                Wake::Deadline => return Err(self.timeout_error(pattern, timeout)),
            }
        }
    }

    fn timeout_error(&self, pattern: &str, timeout: Duration) -> Error {
        Error::MatchTimeout {
            stream: self.stream.name().to_string(),
            pattern: pattern.to_string(),
            timeout_ms: timeout.as_millis() as u64,
            tail: self.stream.tail(self.tail_lines),
        }
    }
}

impl std::fmt::Debug for StreamMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMatcher")
            .field("stream", &self.stream.name())
            .field("cursor", &self.cursor)
            .finish()
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Registry of a session's named streams.
#[derive(Clone, Default)]
pub(crate) struct StreamSet {
    streams: Arc<dashmap::DashMap<String, OutputStream>>,
}

impl StreamSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Get or create the stream with this name. Creation on first reference
    /// lets a matcher attach before the peripheral has produced anything.
    pub(crate) fn get_or_create(&self, name: &str) -> OutputStream {
        self.streams
            .entry(name.to_string())
            .or_insert_with(|| OutputStream::new(name))
            .clone()
    }

    /// Names of all streams seen so far.
    pub(crate) fn names(&self) -> Vec<String> {
        self.streams.iter().map(|e| e.key().clone()).collect()
    }
}
