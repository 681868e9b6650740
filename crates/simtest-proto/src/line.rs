//! Line - Classification of console output lines
//!
//! The monitor multiplexes everything onto one control channel. Framing
//! convention, in classification order:
//! - `(name)` alone on a line is the prompt: it acknowledges the in-flight
//!   command and closes its response window.
//! - `[stream] text` is output of a named virtual peripheral.
//! - `LEVEL: text` (optionally after a `HH:MM:SS[.frac]` timestamp) is an
//!   asynchronous simulator log line.
//! - Anything else is synchronous response text for the in-flight command.

use serde::{Deserialize, Serialize};

/// Severity of a simulator log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very chatty tracing output
    Noisy,
    /// Debug diagnostics
    Debug,
    /// Informational
    Info,
    /// Warnings
    Warning,
    /// Errors reported asynchronously by the simulator
    Error,
}

impl LogLevel {
    /// Returns the tag the console uses for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noisy => "NOISY",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOISY" => Ok(Self::Noisy),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// One classified line of console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    /// Monitor prompt, acknowledging the in-flight command
    Prompt {
        /// Machine or monitor name inside the parentheses
        name: String,
    },
    /// A line produced by a named virtual peripheral
    Stream {
        /// Stream (peripheral) name
        stream: String,
        /// Line payload, without the routing prefix
        text: String,
    },
    /// Asynchronous simulator log output
    Log {
        /// Severity tag
        level: LogLevel,
        /// Log message
        text: String,
    },
    /// Synchronous response text for the in-flight command
    Response {
        /// The raw line
        text: String,
    },
}

impl ConsoleLine {
    /// Classify a raw console line.
    pub fn classify(raw: &str) -> Self {
        let line = raw.trim_end_matches(['\r', '\n']);

        if let Some(name) = parse_prompt(line) {
            return Self::Prompt { name };
        }
        if let Some((stream, text)) = parse_stream(line) {
            return Self::Stream { stream, text };
        }
        if let Some((level, text)) = parse_log(line) {
            return Self::Log { level, text };
        }
        Self::Response {
            text: line.to_string(),
        }
    }
}

/// `(machine-0)` alone on the line, possibly with trailing whitespace.
fn parse_prompt(line: &str) -> Option<String> {
    let trimmed = line.trim_end();
    let inner = trimmed.strip_prefix('(')?.strip_suffix(')')?;
    if inner.is_empty() || inner.contains('(') || inner.contains(')') {
        return None;
    }
    Some(inner.to_string())
}

/// `[uart0] text`: peripheral-output routing prefix.
fn parse_stream(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('[')?;
    let (name, payload) = rest.split_once(']')?;
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_string(), payload.strip_prefix(' ').unwrap_or(payload).to_string()))
}

/// `INFO: text`, optionally preceded by a `HH:MM:SS[.frac]` timestamp.
fn parse_log(line: &str) -> Option<(LogLevel, String)> {
    let rest = strip_timestamp(line).unwrap_or(line);
    let (tag, text) = rest.split_once(':')?;
    let level = tag.parse::<LogLevel>().ok()?;
    Some((level, text.strip_prefix(' ').unwrap_or(text).to_string()))
}

/// Strip a leading wall-clock timestamp token, returning the remainder.
fn strip_timestamp(line: &str) -> Option<&str> {
    let (token, rest) = line.split_once(' ')?;
    let mut parts = token.splitn(3, ':');
    for _ in 0..3 {
        let field = parts.next()?;
        let digits = field.split('.').next().unwrap_or(field);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }
    Some(rest)
}
