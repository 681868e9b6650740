//! Command - High-level operations encoded as monitor command lines
//!
//! Each [`ConsoleCommand`] encodes to exactly one line of monitor text.
//! The monitor grammar uses `@path` for file references and double-quoted
//! strings for names and UART payloads.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default address space for binary loads.
pub const DEFAULT_ADDRESS_SPACE: &str = "sysbus";

/// Monitor banner printed before a command-level failure report.
const ERROR_BANNER: &str = "There was an error executing command";

/// A single instruction for the simulator console.
///
/// Immutable once issued; `encode()` produces the wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Create a named machine and switch the monitor to it
    CreateMachine {
        /// Machine display name
        name: String,
    },
    /// Load a platform description file into the current machine
    LoadPlatform {
        /// Path to the platform description
        path: PathBuf,
    },
    /// Load a guest binary into an address space
    LoadBinary {
        /// Path to the guest binary
        path: PathBuf,
        /// Target address space; defaults to `sysbus`
        address_space: Option<String>,
    },
    /// Start emulation
    Start,
    /// Pause emulation; idempotent on the console side
    Pause,
    /// Reset the current machine
    Reset,
    /// Write a line of input to a virtual UART
    WriteUart {
        /// Terminal peripheral name, e.g. `sysbus.uart`
        terminal: String,
        /// Input text, sent as one line
        text: String,
    },
    /// Ask the simulator process to exit
    Quit,
    /// Verbatim monitor command, passed through unmodified
    Raw {
        /// The command line to send
        text: String,
    },
}

/// Coarse command category, used to map console error reports to typed errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Platform description load
    LoadPlatform,
    /// Guest binary load
    LoadBinary,
    /// Anything else
    Other,
}

impl ConsoleCommand {
    /// Encode this command as one monitor line (without trailing newline).
    pub fn encode(&self) -> String {
        match self {
            Self::CreateMachine { name } => format!("mach create \"{}\"", quote(name)),
            Self::LoadPlatform { path } => {
                format!("machine LoadPlatformDescription @{}", path.display())
            }
            Self::LoadBinary {
                path,
                address_space,
            } => format!(
                "{} LoadELF @{}",
                address_space.as_deref().unwrap_or(DEFAULT_ADDRESS_SPACE),
                path.display()
            ),
            Self::Start => "start".to_string(),
            Self::Pause => "pause".to_string(),
            Self::Reset => "machine Reset".to_string(),
            Self::WriteUart { terminal, text } => {
                format!("{} WriteLine \"{}\"", terminal, quote(text))
            }
            Self::Quit => "quit".to_string(),
            Self::Raw { text } => text.clone(),
        }
    }

    /// The category used for error mapping.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::LoadPlatform { .. } => CommandKind::LoadPlatform,
            Self::LoadBinary { .. } => CommandKind::LoadBinary,
            _ => CommandKind::Other,
        }
    }

    /// Inspect a command's response lines for a console failure report.
    ///
    /// The monitor reports failures as a `There was an error executing
    /// command` banner and/or lines starting with `Error:`. Returns the
    /// typed error for this command kind, or `Ok(())` if the response is
    /// clean.
    pub fn check_response(&self, lines: &[String]) -> Result<()> {
        let detail = match failure_detail(lines) {
            Some(d) => d,
            None => return Ok(()),
        };
        Err(match self.kind() {
            CommandKind::LoadPlatform => Error::PlatformLoad(detail),
            CommandKind::LoadBinary => Error::BinaryLoad(detail),
            CommandKind::Other => Error::Command(detail),
        })
    }
}

impl std::fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Extract the failure detail from a response window, if any.
fn failure_detail(lines: &[String]) -> Option<String> {
    let mut failed = false;
    let mut detail = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.starts_with(ERROR_BANNER) {
            failed = true;
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("Error:") {
            failed = true;
            detail.push(rest.trim().to_string());
        } else if failed && detail.is_empty() && !trimmed.is_empty() {
            // Banner form: the first non-empty line after it carries the reason.
            detail.push(trimmed.to_string());
        }
    }
    if failed {
        Some(if detail.is_empty() {
            "console reported an error".to_string()
        } else {
            detail.join("; ")
        })
    } else {
        None
    }
}

/// Escape `"` and `\` for a double-quoted monitor string.
fn quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_machine_setup() {
        let cmd = ConsoleCommand::CreateMachine {
            name: "digilent-arty".to_string(),
        };
        assert_eq!(cmd.encode(), "mach create \"digilent-arty\"");

        let cmd = ConsoleCommand::LoadPlatform {
            path: PathBuf::from("conf/board.repl"),
        };
        assert_eq!(cmd.encode(), "machine LoadPlatformDescription @conf/board.repl");
    }

    #[test]
    fn test_encode_binary_load_default_address_space() {
        let cmd = ConsoleCommand::LoadBinary {
            path: PathBuf::from("bin/app.elf"),
            address_space: None,
        };
        assert_eq!(cmd.encode(), "sysbus LoadELF @bin/app.elf");

        let cmd = ConsoleCommand::LoadBinary {
            path: PathBuf::from("bin/app.elf"),
            address_space: Some("cpu2.bus".to_string()),
        };
        assert_eq!(cmd.encode(), "cpu2.bus LoadELF @bin/app.elf");
    }

    #[test]
    fn test_encode_uart_write_escapes_quotes() {
        let cmd = ConsoleCommand::WriteUart {
            terminal: "sysbus.uart".to_string(),
            text: "say \"hi\"".to_string(),
        };
        assert_eq!(cmd.encode(), "sysbus.uart WriteLine \"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_encode_control_commands() {
        assert_eq!(ConsoleCommand::Start.encode(), "start");
        assert_eq!(ConsoleCommand::Pause.encode(), "pause");
        assert_eq!(ConsoleCommand::Reset.encode(), "machine Reset");
        assert_eq!(ConsoleCommand::Quit.encode(), "quit");
    }

    #[test]
    fn test_raw_passthrough() {
        let cmd = ConsoleCommand::Raw {
            text: "cpu LogFunctionNames true true".to_string(),
        };
        assert_eq!(cmd.encode(), "cpu LogFunctionNames true true");
        assert_eq!(cmd.kind(), CommandKind::Other);
    }

    #[test]
    fn test_check_response_clean() {
        let cmd = ConsoleCommand::Start;
        let lines = vec!["Starting emulation...".to_string()];
        assert!(cmd.check_response(&lines).is_ok());
    }

    #[test]
    fn test_check_response_error_line_maps_by_kind() {
        let lines = vec!["Error: could not parse platform".to_string()];

        let cmd = ConsoleCommand::LoadPlatform {
            path: PathBuf::from("bad.repl"),
        };
        match cmd.check_response(&lines) {
            Err(Error::PlatformLoad(msg)) => assert_eq!(msg, "could not parse platform"),
            other => panic!("unexpected: {:?}", other),
        }

        let cmd = ConsoleCommand::LoadBinary {
            path: PathBuf::from("bad.elf"),
            address_space: None,
        };
        match cmd.check_response(&lines) {
            Err(Error::BinaryLoad(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }

        let cmd = ConsoleCommand::Start;
        match cmd.check_response(&lines) {
            Err(Error::Command(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_check_response_banner_form() {
        let cmd = ConsoleCommand::Start;
        let lines = vec![
            "There was an error executing command 'start'".to_string(),
            "machine has no CPU".to_string(),
        ];
        match cmd.check_response(&lines) {
            Err(Error::Command(msg)) => assert_eq!(msg, "machine has no CPU"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
