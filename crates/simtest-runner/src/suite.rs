//! Suite - declarative test scenarios
//!
//! A suite file is YAML: suite-level setup runs once, `case-setup` runs
//! before every case, `teardown` runs after every case no matter how it
//! ended. Stream names double as the peripheral name for `write-line`
//! steps, so `uart0` is both where input goes and where output is watched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_stream() -> String {
    "uart0".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

/// Per-suite fallbacks for wait steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SuiteDefaults {
    /// Stream watched and written when a step names none
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Wait timeout when a step names none
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SuiteDefaults {
    fn default() -> Self {
        Self {
            stream: default_stream(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A guest binary reference: bare path, or path plus address space.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinaryRef {
    /// Load into the default address space
    Path(PathBuf),
    /// Load into a named address space
    Detailed {
        /// Path to the binary
        path: PathBuf,
        /// Target address space, e.g. `cpu2.bus`
        #[serde(rename = "address-space", default)]
        address_space: Option<String>,
    },
}

impl BinaryRef {
    /// The referenced path.
    pub fn path(&self) -> &Path {
        match self {
            Self::Path(path) => path,
            Self::Detailed { path, .. } => path,
        }
    }

    /// The explicit address space, if any.
    pub fn address_space(&self) -> Option<&str> {
        match self {
            Self::Path(_) => None,
            Self::Detailed { address_space, .. } => address_space.as_deref(),
        }
    }
}

/// Input written to a stream's peripheral.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WriteSpec {
    /// Target stream; suite default when absent
    #[serde(default)]
    pub stream: Option<String>,
    /// The line to write
    pub text: String,
}

/// Wait for an exact line on a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WaitLineSpec {
    /// Watched stream; suite default when absent
    #[serde(default)]
    pub stream: Option<String>,
    /// The literal line expected
    pub text: String,
    /// Timeout; suite default when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Wait for a guest prompt (line suffix) on a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WaitPromptSpec {
    /// Watched stream; suite default when absent
    #[serde(default)]
    pub stream: Option<String>,
    /// Trailing pattern the prompt line must end with
    pub prompt: String,
    /// Timeout; suite default when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// One step of a scenario: a console command or a wait condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Load a platform description file
    LoadPlatform(PathBuf),
    /// Load a guest binary
    LoadBinary(BinaryRef),
    /// Start emulation
    Start,
    /// Pause emulation
    Pause,
    /// Reset the machine
    Reset,
    /// Write one line of input to a stream's peripheral
    WriteLine(WriteSpec),
    /// Verbatim monitor command
    Raw(String),
    /// Block until an exact line appears
    WaitForLine(WaitLineSpec),
    /// Block until a prompt (line suffix) appears
    WaitForPrompt(WaitPromptSpec),
}

impl Step {
    /// Short human label, used in reports to name a failing step.
    pub fn label(&self) -> String {
        match self {
            Self::LoadPlatform(path) => format!("load-platform {}", path.display()),
            Self::LoadBinary(binary) => format!("load-binary {}", binary.path().display()),
            Self::Start => "start".to_string(),
            Self::Pause => "pause".to_string(),
            Self::Reset => "reset".to_string(),
            Self::WriteLine(spec) => format!("write-line {:?}", spec.text),
            Self::Raw(text) => format!("raw {:?}", text),
            Self::WaitForLine(spec) => format!("wait-for-line {:?}", spec.text),
            Self::WaitForPrompt(spec) => format!("wait-for-prompt {:?}", spec.prompt),
        }
    }
}

/// A named, ordered sequence of steps with a single verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TestCase {
    /// Case name, unique within the suite
    pub name: String,
    /// Steps run in order; the first failure ends the case
    pub steps: Vec<Step>,
}

/// A whole suite file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Suite {
    /// Suite name, used in the report
    pub name: String,
    /// Machine created before suite setup, if named
    #[serde(default)]
    pub machine: Option<String>,
    /// Fallbacks for wait and write steps
    #[serde(default)]
    pub defaults: SuiteDefaults,
    /// Runs once, before any case
    #[serde(default)]
    pub setup: Vec<Step>,
    /// Runs before every case
    #[serde(default)]
    pub case_setup: Vec<Step>,
    /// Runs after every case, regardless of its outcome
    #[serde(default)]
    pub teardown: Vec<Step>,
    /// The cases, run in order
    pub cases: Vec<TestCase>,
}

impl Suite {
    /// Parse and validate a suite from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let suite: Self = serde_yaml::from_str(text)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Read, parse and validate a suite file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// The effective timeout for a wait step.
    pub fn wait_timeout(&self, step_timeout_secs: Option<u64>) -> Duration {
        Duration::from_secs(step_timeout_secs.unwrap_or(self.defaults.timeout_secs))
    }

    /// The effective stream for a step.
    pub fn stream_name<'a>(&'a self, step_stream: Option<&'a str>) -> &'a str {
        step_stream.unwrap_or(&self.defaults.stream)
    }

    fn validate(&self) -> Result<()> {
        if self.cases.is_empty() {
            return Err(Error::InvalidSuite(format!(
                "suite '{}' has no test cases",
                self.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for case in &self.cases {
            if case.steps.is_empty() {
                return Err(Error::InvalidSuite(format!(
                    "case '{}' has no steps",
                    case.name
                )));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(Error::InvalidSuite(format!(
                    "duplicate case name '{}'",
                    case.name
                )));
            }
        }
        if self.defaults.timeout_secs == 0 {
            return Err(Error::InvalidSuite(
                "default timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
