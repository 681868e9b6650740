//! CLI module for simtest
//!
//! Commands:
//! - `run`: execute suite files against a simulator and report verdicts
//! - `check`: validate suite files without touching a simulator
//! - `exec`: send one raw monitor command and print the response

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

pub mod check;
pub mod exec;
pub mod run;

/// Simtest CLI
#[derive(Parser, Debug)]
#[command(name = "simtest")]
#[command(about = "Console-driven test harness for machine simulators")]
#[command(version)]
pub struct Cli {
    /// Harness configuration file
    #[arg(long, global = true, default_value = "simtest.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run suite files; exit status is non-zero if any case fails
    Run {
        /// Suite files to run, in order
        #[arg(required = true)]
        suites: Vec<PathBuf>,
        /// Write the JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Parse and validate suite files
    Check {
        /// Suite files to check
        #[arg(required = true)]
        suites: Vec<PathBuf>,
    },
    /// Send a raw monitor command and print its response lines
    Exec {
        /// The command, joined with spaces
        #[arg(required = true)]
        command: Vec<String>,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = crate::config::HarnessConfig::load(&cli.config)?;
    match cli.command {
        Commands::Run { suites, report } => run::run(&config, &suites, report.as_deref()).await,
        Commands::Check { suites } => check::run(&suites),
        Commands::Exec { command } => exec::run(&config, &command.join(" ")).await,
    }
}
