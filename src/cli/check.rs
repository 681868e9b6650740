//! `simtest check` - validate suite files offline

use std::path::PathBuf;
use std::process::ExitCode;

use simtest_runner::Suite;

pub fn run(suite_paths: &[PathBuf]) -> anyhow::Result<ExitCode> {
    let mut ok = true;
    for path in suite_paths {
        match Suite::from_file(path) {
            Ok(suite) => {
                println!(
                    "{}: ok ({} cases)",
                    path.display(),
                    suite.cases.len()
                );
            }
            Err(e) => {
                ok = false;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
