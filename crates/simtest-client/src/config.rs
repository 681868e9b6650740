//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to reach the simulator console.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Endpoint {
    /// Spawn the simulator as a child process and talk over stdio
    Spawn {
        /// Simulator executable
        program: String,
        /// Extra arguments, e.g. `["--console", "--disable-xwt"]`
        #[serde(default)]
        args: Vec<String>,
    },
    /// Connect to an already-running monitor socket
    Tcp {
        /// `host:port` of the monitor
        address: String,
    },
}

/// Configuration for one console session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Where the simulator console lives
    #[serde(flatten)]
    pub endpoint: Endpoint,

    /// Bound on establishing the transport and seeing the first prompt
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Bound on a command's prompt acknowledgment
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,

    /// Bound on the liveness probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Diagnostic tail length carried by match-timeout errors
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_ack_timeout_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_tail_lines() -> usize {
    20
}

impl SessionConfig {
    /// Config for a spawned simulator process.
    pub fn spawn(program: impl Into<String>, args: Vec<String>) -> Self {
        Self::with_endpoint(Endpoint::Spawn {
            program: program.into(),
            args,
        })
    }

    /// Config for a TCP monitor socket.
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::with_endpoint(Endpoint::Tcp {
            address: address.into(),
        })
    }

    fn with_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout_secs: default_connect_timeout_secs(),
            ack_timeout_secs: default_ack_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            tail_lines: default_tail_lines(),
        }
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Acknowledgment timeout as a [`Duration`].
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// Liveness probe timeout as a [`Duration`].
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_config_from_toml() {
        let cfg: SessionConfig = toml::from_str(
            r#"
            mode = "spawn"
            program = "renode"
            args = ["--console"]
            connect-timeout-secs = 3
            "#,
        )
        .unwrap();
        match &cfg.endpoint {
            Endpoint::Spawn { program, args } => {
                assert_eq!(program, "renode");
                assert_eq!(args, &["--console".to_string()]);
            }
            other => panic!("unexpected endpoint: {:?}", other),
        }
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(3));
        // Defaults fill the rest.
        assert_eq!(cfg.ack_timeout_secs, 10);
        assert_eq!(cfg.tail_lines, 20);
    }

    #[test]
    fn test_tcp_config_from_toml() {
        let cfg: SessionConfig = toml::from_str(
            r#"
            mode = "tcp"
            address = "127.0.0.1:1234"
            "#,
        )
        .unwrap();
        match &cfg.endpoint {
            Endpoint::Tcp { address } => assert_eq!(address, "127.0.0.1:1234"),
            other => panic!("unexpected endpoint: {:?}", other),
        }
    }
}
