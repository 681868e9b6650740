//! Simtest Runner - scripted scenarios against a simulator console
//!
//! This crate turns suite files into verdicts:
//! - Suite: declarative YAML scenarios (setup, per-case setup, teardown,
//!   ordered command/wait steps)
//! - Runner: executes cases in order with guaranteed per-case teardown
//! - Report: per-case records and aggregate counts for CI

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod report;
pub mod runner;
pub mod suite;

pub use error::{Error, Result};
pub use report::{CaseRecord, SuiteReport, Verdict};
pub use runner::ScenarioRunner;
pub use suite::{BinaryRef, Step, Suite, SuiteDefaults, TestCase, WaitLineSpec, WaitPromptSpec, WriteSpec};
