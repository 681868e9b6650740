//! Report - machine-parseable suite results
//!
//! One record per case plus aggregate counts, serialized as JSON for CI
//! consumers. The suite exit status is non-zero iff any case failed or
//! errored.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Terminal outcome of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Every step completed
    Passed,
    /// An expectation was not met: a wait timed out or the console
    /// rejected a command
    Failed,
    /// Infrastructure gave out: connect/transport failure, or suite setup
    /// never succeeded
    Errored,
}

impl Verdict {
    /// Returns the lowercase string used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result record for one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Case name from the suite file
    pub name: String,
    /// Terminal outcome
    pub verdict: Verdict,
    /// Wall-clock duration of the case, teardown included
    pub duration_ms: u64,
    /// Label of the step that resolved the case, for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failing_step: Option<String>,
    /// Error text, for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Teardown failure, recorded but never changing the verdict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
    /// Bounded tail of the watched stream, for diagnosis
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_tail: Vec<String>,
}

impl CaseRecord {
    /// A clean pass.
    pub fn passed(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            verdict: Verdict::Passed,
            duration_ms,
            failing_step: None,
            error: None,
            teardown_error: None,
            output_tail: Vec::new(),
        }
    }
}

/// Aggregated results of one suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Suite name
    pub suite: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Cases that passed
    pub passed: usize,
    /// Cases that failed on an expectation
    pub failed: usize,
    /// Cases that errored on infrastructure
    pub errored: usize,
    /// Per-case records, in suite order
    pub cases: Vec<CaseRecord>,
}

impl SuiteReport {
    /// Build a report from case records, computing the aggregates.
    pub fn new(
        suite: impl Into<String>,
        started_at: DateTime<Utc>,
        cases: Vec<CaseRecord>,
    ) -> Self {
        let passed = count(&cases, Verdict::Passed);
        let failed = count(&cases, Verdict::Failed);
        let errored = count(&cases, Verdict::Errored);
        Self {
            suite: suite.into(),
            started_at,
            finished_at: Utc::now(),
            passed,
            failed,
            errored,
            cases,
        }
    }

    /// True iff no case failed or errored.
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Process exit code for this run: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }

    /// Pretty JSON for files and stdout.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report to a file.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} passed, {} failed, {} errored",
            self.suite, self.passed, self.failed, self.errored
        )
    }
}

fn count(cases: &[CaseRecord], verdict: Verdict) -> usize {
    cases.iter().filter(|c| c.verdict == verdict).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_record(name: &str) -> CaseRecord {
        CaseRecord {
            name: name.to_string(),
            verdict: Verdict::Failed,
            duration_ms: 5100,
            failing_step: Some("wait-for-line \"Hello, World!\"".to_string()),
            error: Some("wait timed out after 5000ms".to_string()),
            teardown_error: None,
            output_tail: vec!["booting...".to_string()],
        }
    }

    #[test]
    fn test_aggregates_and_exit_code() {
        let report = SuiteReport::new(
            "uart-smoke",
            Utc::now(),
            vec![CaseRecord::passed("a", 900), failed_record("b")],
        );
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errored, 0);
        assert!(!report.all_passed());
        assert_eq!(report.exit_code(), 1);

        let clean = SuiteReport::new("ok", Utc::now(), vec![CaseRecord::passed("a", 10)]);
        assert_eq!(clean.exit_code(), 0);
    }

    #[test]
    fn test_json_shape_is_stable() {
        let report = SuiteReport::new("uart-smoke", Utc::now(), vec![failed_record("boot")]);
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["suite"], "uart-smoke");
        assert_eq!(value["failed"], 1);
        assert_eq!(value["cases"][0]["name"], "boot");
        assert_eq!(value["cases"][0]["verdict"], "failed");
        assert_eq!(value["cases"][0]["output_tail"][0], "booting...");
        // Absent diagnostics are omitted, not null.
        assert!(value["cases"][0].get("teardown_error").is_none());
    }

    #[test]
    fn test_passed_record_omits_diagnostics() {
        let report = SuiteReport::new("ok", Utc::now(), vec![CaseRecord::passed("a", 10)]);
        let value: serde_json::Value =
            serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert!(value["cases"][0].get("failing_step").is_none());
        assert!(value["cases"][0].get("error").is_none());
        assert!(value["cases"][0].get("output_tail").is_none());
    }

    #[test]
    fn test_report_roundtrip() {
        let report = SuiteReport::new("rt", Utc::now(), vec![failed_record("x")]);
        let parsed: SuiteReport =
            serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(parsed.suite, "rt");
        assert_eq!(parsed.cases[0].verdict, Verdict::Failed);
        assert_eq!(parsed.summary(), "rt: 0 passed, 1 failed, 0 errored");
    }
}
