//! `simtest exec` - one-shot raw monitor command

use std::process::ExitCode;

use simtest_client::Session;

use crate::config::HarnessConfig;

pub async fn run(config: &HarnessConfig, command: &str) -> anyhow::Result<ExitCode> {
    let mut session = Session::connect(config.session_config()).await?;
    let result = session.execute_raw(command).await;
    session.shutdown().await;

    match result {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
