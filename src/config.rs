//! Harness configuration file (`simtest.toml`)
//!
//! The `[simulator]` table is the session configuration; `[liveness]` and
//! `[defaults]` tune the probe and diagnostics. A missing file means
//! built-in defaults: spawn `renode` in console mode.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use simtest_client::SessionConfig;

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_tail_lines() -> usize {
    20
}

/// `[liveness]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LivenessConfig {
    /// Bound on the liveness probe's acknowledgment
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// `[defaults]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunDefaults {
    /// Diagnostic tail length attached to failures
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            tail_lines: default_tail_lines(),
        }
    }
}

/// The whole harness configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HarnessConfig {
    /// How to reach the simulator console
    pub simulator: SessionConfig,
    /// Liveness probe tuning
    #[serde(default)]
    pub liveness: LivenessConfig,
    /// Diagnostics tuning
    #[serde(default)]
    pub defaults: RunDefaults,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            simulator: SessionConfig::spawn(
                "renode",
                vec!["--console".to_string(), "--disable-xwt".to_string()],
            ),
            liveness: LivenessConfig::default(),
            defaults: RunDefaults::default(),
        }
    }
}

impl HarnessConfig {
    /// Load from `path`; built-in defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// The session configuration with probe and diagnostics settings folded in.
    pub fn session_config(&self) -> SessionConfig {
        let mut session = self.simulator.clone();
        session.probe_timeout_secs = self.liveness.probe_timeout_secs;
        session.tail_lines = self.defaults.tail_lines;
        session
    }
}
