//! `simtest run` - execute suites and report

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use tracing::info;

use simtest_client::Session;
use simtest_runner::{ScenarioRunner, Suite, SuiteReport, Verdict};

use crate::config::HarnessConfig;

pub async fn run(
    config: &HarnessConfig,
    suite_paths: &[PathBuf],
    report_path: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    // Parse everything up front so a typo in the last suite doesn't waste a
    // simulator run of the first.
    let mut suites = Vec::with_capacity(suite_paths.len());
    for path in suite_paths {
        let suite =
            Suite::from_file(path).with_context(|| format!("loading {}", path.display()))?;
        suites.push(suite);
    }

    let mut session = Session::connect(config.session_config()).await?;
    let runner = ScenarioRunner::new();

    let mut reports: Vec<SuiteReport> = Vec::with_capacity(suites.len());
    for suite in &suites {
        let report = runner.run_suite(&mut session, suite).await;
        print_report(&report);
        reports.push(report);
    }
    session.shutdown().await;

    if let Some(path) = report_path {
        write_reports(path, &reports)?;
        info!(path = %path.display(), "Report written");
    }

    let all_passed = reports.iter().all(SuiteReport::all_passed);
    Ok(if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &SuiteReport) {
    for case in &report.cases {
        let tag = match case.verdict {
            Verdict::Passed => "PASS ",
            Verdict::Failed => "FAIL ",
            Verdict::Errored => "ERROR",
        };
        println!("{} {} ({} ms)", tag, case.name, case.duration_ms);
        if let Some(step) = &case.failing_step {
            println!("      at {}", step);
        }
        if let Some(error) = &case.error {
            println!("      {}", error);
        }
        for line in &case.output_tail {
            println!("      | {}", line);
        }
    }
    println!("{}", report.summary());
}

/// One suite writes its report object; several write an array.
fn write_reports(path: &Path, reports: &[SuiteReport]) -> anyhow::Result<()> {
    let json = match reports {
        [single] => single.to_json()?,
        many => serde_json::to_string_pretty(many)?,
    };
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
