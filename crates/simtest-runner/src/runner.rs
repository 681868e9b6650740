//! Runner - executes suites against a live session
//!
//! Each case runs its steps strictly in order; the first failing step
//! resolves the case and the rest are skipped. Per-case teardown always
//! runs, exactly once, whatever the outcome. Expectation-level failures
//! (timeouts, rejected commands) make a case Failed; infrastructure faults
//! make it Errored and trigger one session restart attempt before the next
//! case.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use simtest_client::{Error as ClientError, Session, StreamMatcher};

use crate::report::{CaseRecord, SuiteReport, Verdict};
use crate::suite::{Step, Suite, TestCase};

/// Executes suites and produces reports. Stateless between runs.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner;

impl ScenarioRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }

    /// Run every case of `suite` on `session` and report the outcome.
    ///
    /// Never fails as a call: infrastructure trouble surfaces as Errored
    /// case records. The runner does not retry cases.
    pub async fn run_suite(&self, session: &mut Session, suite: &Suite) -> SuiteReport {
        let started_at = Utc::now();
        info!(suite = %suite.name, cases = suite.cases.len(), "Running suite");

        if let Some((label, err)) = self.run_suite_setup(session, suite).await {
            error!(suite = %suite.name, step = %label, error = %err, "Suite setup failed");
            let records = suite
                .cases
                .iter()
                .map(|case| errored_without_running(case, &format!("suite setup [{}]: {}", label, err)))
                .collect();
            return finish(suite, started_at, records);
        }

        let mut records = Vec::with_capacity(suite.cases.len());
        let mut session_down: Option<String> = None;
        for case in &suite.cases {
            if let Some(reason) = &session_down {
                records.push(errored_without_running(case, reason));
                continue;
            }

            let record = self.run_case(session, suite, case).await;
            let errored = record.verdict == Verdict::Errored;
            records.push(record);

            if errored {
                warn!(suite = %suite.name, case = %case.name, "Session fault; attempting restart");
                if let Err(e) = session.restart().await {
                    error!(error = %e, "Session restart failed; aborting remaining cases");
                    session_down = Some(format!("session unavailable: {}", e));
                }
            }
        }
        finish(suite, started_at, records)
    }

    /// Suite-level setup: machine creation plus the suite's setup steps.
    /// Returns the failing step label and error, if any.
    async fn run_suite_setup(
        &self,
        session: &Session,
        suite: &Suite,
    ) -> Option<(String, ClientError)> {
        if let Some(machine) = &suite.machine {
            if let Err(e) = session.create_machine(machine).await {
                return Some((format!("create machine '{}'", machine), e));
            }
        }
        let cancel = CancellationToken::new();
        let mut matchers = HashMap::new();
        for step in &suite.setup {
            if let Err(e) = run_step(session, suite, step, &cancel, &mut matchers).await {
                return Some((step.label(), e));
            }
        }
        None
    }

    async fn run_case(&self, session: &Session, suite: &Suite, case: &TestCase) -> CaseRecord {
        let started = Instant::now();
        let cancel = CancellationToken::new();
        debug!(case = %case.name, "Case running");

        // Matchers open their windows before any step runs, so output
        // produced by an early `start` is already in every wait's view.
        let mut matchers: HashMap<String, StreamMatcher> = case_streams(suite, case)
            .into_iter()
            .map(|name| {
                let matcher = session.matcher_with_cancel(&name, cancel.clone());
                (name, matcher)
            })
            .collect();

        let mut failure: Option<(String, ClientError)> = None;
        for step in suite.case_setup.iter().chain(case.steps.iter()) {
            if let Err(err) = run_step(session, suite, step, &cancel, &mut matchers).await {
                debug!(case = %case.name, step = %step.label(), error = %err, "Step failed");
                failure = Some((step.label(), err));
                cancel.cancel();
                break;
            }
        }

        let teardown_error = self.run_teardown(session, suite, case).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match failure {
            None => {
                info!(case = %case.name, duration_ms, "Case passed");
                CaseRecord {
                    teardown_error,
                    ..CaseRecord::passed(&case.name, duration_ms)
                }
            }
            Some((label, err)) => {
                let verdict = classify(&err);
                warn!(
                    case = %case.name,
                    step = %label,
                    error = %err,
                    verdict = %verdict,
                    "Case did not pass"
                );
                CaseRecord {
                    name: case.name.clone(),
                    verdict,
                    duration_ms,
                    failing_step: Some(label),
                    error: Some(err.to_string()),
                    teardown_error,
                    output_tail: session
                        .stream(&suite.defaults.stream)
                        .tail(session.config().tail_lines),
                }
            }
        }
    }

    /// Per-case teardown; runs on its own cancellation scope so a failed
    /// case cannot cancel its own cleanup.
    async fn run_teardown(
        &self,
        session: &Session,
        suite: &Suite,
        case: &TestCase,
    ) -> Option<String> {
        let cancel = CancellationToken::new();
        let mut matchers = HashMap::new();
        for step in &suite.teardown {
            if let Err(err) = run_step(session, suite, step, &cancel, &mut matchers).await {
                warn!(case = %case.name, step = %step.label(), error = %err, "Teardown step failed");
                return Some(format!("{}: {}", step.label(), err));
            }
        }
        None
    }
}

async fn run_step(
    session: &Session,
    suite: &Suite,
    step: &Step,
    cancel: &CancellationToken,
    matchers: &mut HashMap<String, StreamMatcher>,
) -> Result<(), ClientError> {
    match step {
        Step::LoadPlatform(path) => session.load_platform(path.clone()).await,
        Step::LoadBinary(binary) => {
            session
                .load_binary(binary.path().to_path_buf(), binary.address_space())
                .await
        }
        Step::Start => session.start().await,
        Step::Pause => session.pause().await,
        Step::Reset => session.reset().await,
        Step::WriteLine(spec) => {
            let stream = suite.stream_name(spec.stream.as_deref());
            session.write_uart(stream, &spec.text).await
        }
        Step::Raw(text) => session.execute_raw(text).await.map(|_| ()),
        Step::WaitForLine(spec) => {
            let stream = suite.stream_name(spec.stream.as_deref());
            let matcher = matcher_for(session, cancel, matchers, stream);
            matcher
                .wait_for_line(&spec.text, suite.wait_timeout(spec.timeout_secs))
                .await
                .map(|_| ())
        }
        Step::WaitForPrompt(spec) => {
            let stream = suite.stream_name(spec.stream.as_deref());
            let matcher = matcher_for(session, cancel, matchers, stream);
            matcher
                .wait_for_prompt(&spec.prompt, suite.wait_timeout(spec.timeout_secs))
                .await
                .map(|_| ())
        }
    }
}

fn matcher_for<'a>(
    session: &Session,
    cancel: &CancellationToken,
    matchers: &'a mut HashMap<String, StreamMatcher>,
    stream: &str,
) -> &'a mut StreamMatcher {
    matchers
        .entry(stream.to_string())
        .or_insert_with(|| session.matcher_with_cancel(stream, cancel.clone()))
}

/// Streams a case will touch: the suite default plus anything named by a
/// wait or write step in case setup or the case itself.
fn case_streams(suite: &Suite, case: &TestCase) -> HashSet<String> {
    let mut names = HashSet::new();
    names.insert(suite.defaults.stream.clone());
    for step in suite.case_setup.iter().chain(case.steps.iter()) {
        let named = match step {
            Step::WriteLine(spec) => spec.stream.as_deref(),
            Step::WaitForLine(spec) => spec.stream.as_deref(),
            Step::WaitForPrompt(spec) => spec.stream.as_deref(),
            _ => None,
        };
        if let Some(name) = named {
            names.insert(name.to_string());
        }
    }
    names
}

fn classify(err: &ClientError) -> Verdict {
    match err {
        ClientError::MatchTimeout { .. } | ClientError::Protocol(_) => Verdict::Failed,
        ClientError::Connect(_) | ClientError::Channel(_) | ClientError::Cancelled => {
            Verdict::Errored
        }
    }
}

fn errored_without_running(case: &TestCase, reason: &str) -> CaseRecord {
    CaseRecord {
        name: case.name.clone(),
        verdict: Verdict::Errored,
        duration_ms: 0,
        failing_step: None,
        error: Some(reason.to_string()),
        teardown_error: None,
        output_tail: Vec::new(),
    }
}

fn finish(suite: &Suite, started_at: chrono::DateTime<Utc>, records: Vec<CaseRecord>) -> SuiteReport {
    let report = SuiteReport::new(&suite.name, started_at, records);
    info!("{}", report.summary());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtest_client::{SessionConfig, Transport};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Scripted console: greets with a prompt, logs every received command,
    /// answers each with `respond(cmd)` then a prompt. `die` drops the
    /// connection mid-session.
    fn scripted_console(
        io: DuplexStream,
        respond: impl FnMut(&str) -> Vec<String> + Send + 'static,
    ) -> Arc<Mutex<Vec<String>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        let mut respond = respond;
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(io);
            let mut lines = BufReader::new(read).lines();
            if write.write_all(b"(monitor)\n").await.is_err() {
                return;
            }
            while let Ok(Some(cmd)) = lines.next_line().await {
                log.lock().unwrap().push(cmd.clone());
                if cmd == "quit" || cmd == "die" {
                    return;
                }
                for reply in respond(&cmd) {
                    if write.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                        return;
                    }
                }
                if write.write_all(b"(monitor)\n").await.is_err() {
                    return;
                }
            }
        });
        received
    }

    async fn session_with_console(
        respond: impl FnMut(&str) -> Vec<String> + Send + 'static,
    ) -> (Session, Arc<Mutex<Vec<String>>>) {
        let (client, server) = tokio::io::duplex(4096);
        let received = scripted_console(server, respond);
        let (read, write) = tokio::io::split(client);
        // Restart targets a closed port, so a dead console stays dead fast.
        let mut config = SessionConfig::tcp("127.0.0.1:9");
        config.connect_timeout_secs = 1;
        config.ack_timeout_secs = 2;
        let session = Session::attach(config, Transport::from_io(read, write))
            .await
            .unwrap();
        (session, received)
    }

    fn smoke_suite(wait_timeout_secs: u64) -> Suite {
        Suite::from_yaml(&format!(
            r#"
name: uart-smoke
defaults:
  stream: uart0
  timeout-secs: {}
teardown:
  - pause
cases:
  - name: boot
    steps:
      - load-platform: ok.repl
      - load-binary: ok.elf
      - start
      - wait-for-line: {{ text: "Hello, World!" }}
      - wait-for-prompt: {{ prompt: "main>" }}
"#,
            wait_timeout_secs
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_passing_scenario() {
        let (mut session, received) = session_with_console(|cmd| {
            if cmd == "start" {
                vec![
                    "[uart0] Hello, World!".to_string(),
                    "[uart0] app main>".to_string(),
                ]
            } else {
                Vec::new()
            }
        })
        .await;

        let suite = smoke_suite(5);
        let report = ScenarioRunner::new().run_suite(&mut session, &suite).await;

        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.errored, 0);
        assert_eq!(report.exit_code(), 0);
        assert!(report.cases[0].failing_step.is_none());

        let log = received.lock().unwrap();
        assert_eq!(
            log.as_slice(),
            [
                "machine LoadPlatformDescription @ok.repl",
                "sysbus LoadELF @ok.elf",
                "start",
                "pause",
            ]
        );
    }

    #[tokio::test]
    async fn test_timeout_fails_case_and_teardown_still_runs() {
        // The console never emits the expected line.
        let (mut session, received) = session_with_console(|_| Vec::new()).await;
        let suite = smoke_suite(1);

        let started = Instant::now();
        let report = ScenarioRunner::new().run_suite(&mut session, &suite).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.exit_code(), 1);
        let record = &report.cases[0];
        assert_eq!(record.verdict, Verdict::Failed);
        assert_eq!(
            record.failing_step.as_deref(),
            Some("wait-for-line \"Hello, World!\"")
        );
        assert!(record.error.as_deref().unwrap().contains("timed out"));
        // Not before the configured timeout.
        assert!(started.elapsed() >= std::time::Duration::from_secs(1));

        let log = received.lock().unwrap();
        assert!(log.contains(&"pause".to_string()), "teardown skipped: {:?}", log);
    }

    #[tokio::test]
    async fn test_teardown_runs_exactly_once_per_case() {
        let (mut session, received) = session_with_console(|cmd| {
            if cmd == "start" {
                vec!["[uart0] ready".to_string()]
            } else if cmd.contains("bad.repl") {
                vec!["Error: parse error".to_string()]
            } else {
                Vec::new()
            }
        })
        .await;

        let suite = Suite::from_yaml(
            r#"
name: outcomes
defaults:
  timeout-secs: 1
teardown:
  - pause
cases:
  - name: passes
    steps:
      - start
      - wait-for-line: { text: "ready" }
  - name: fails-on-command
    steps:
      - load-platform: bad.repl
  - name: fails-on-timeout
    steps:
      - wait-for-line: { text: "never" }
"#,
        )
        .unwrap();

        let report = ScenarioRunner::new().run_suite(&mut session, &suite).await;
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 2);

        let log = received.lock().unwrap();
        let pauses = log.iter().filter(|c| c.as_str() == "pause").count();
        assert_eq!(pauses, 3, "one teardown per case: {:?}", log);
    }

    #[tokio::test]
    async fn test_command_rejection_reports_failing_step_and_tail() {
        let (mut session, _received) = session_with_console(|cmd| {
            if cmd == "start" {
                vec!["[uart0] booting".to_string()]
            } else if cmd.contains("LoadELF") {
                vec!["Error: file not found".to_string()]
            } else {
                Vec::new()
            }
        })
        .await;

        let suite = Suite::from_yaml(
            r#"
name: tail
defaults:
  timeout-secs: 1
cases:
  - name: bad-binary
    steps:
      - start
      - wait-for-line: { text: "booting" }
      - load-binary: missing.elf
"#,
        )
        .unwrap();

        let report = ScenarioRunner::new().run_suite(&mut session, &suite).await;
        let record = &report.cases[0];
        assert_eq!(record.verdict, Verdict::Failed);
        assert_eq!(record.failing_step.as_deref(), Some("load-binary missing.elf"));
        assert!(record.error.as_deref().unwrap().contains("binary load rejected"));
        assert_eq!(record.output_tail, vec!["booting".to_string()]);
    }

    #[tokio::test]
    async fn test_suite_setup_failure_errors_all_cases() {
        let (mut session, _received) = session_with_console(|cmd| {
            if cmd.contains("LoadPlatformDescription") {
                vec!["Error: parse error".to_string()]
            } else {
                Vec::new()
            }
        })
        .await;

        let suite = Suite::from_yaml(
            r#"
name: broken-setup
setup:
  - load-platform: bad.repl
cases:
  - name: first
    steps: [start]
  - name: second
    steps: [start]
"#,
        )
        .unwrap();

        let report = ScenarioRunner::new().run_suite(&mut session, &suite).await;
        assert_eq!(report.errored, 2);
        assert_eq!(report.exit_code(), 1);
        for record in &report.cases {
            assert_eq!(record.verdict, Verdict::Errored);
            assert!(record.error.as_deref().unwrap().contains("suite setup"));
        }
    }

    #[tokio::test]
    async fn test_session_fault_errors_case_and_aborts_after_failed_restart() {
        let (mut session, _received) = session_with_console(|_| Vec::new()).await;

        let suite = Suite::from_yaml(
            r#"
name: dying
defaults:
  timeout-secs: 1
cases:
  - name: killer
    steps:
      - raw: die
      - wait-for-line: { text: "never" }
  - name: skipped
    steps: [start]
"#,
        )
        .unwrap();

        let report = ScenarioRunner::new().run_suite(&mut session, &suite).await;
        assert_eq!(report.errored, 2);

        let killer = &report.cases[0];
        assert_eq!(killer.verdict, Verdict::Errored);
        assert_eq!(killer.failing_step.as_deref(), Some("raw \"die\""));

        let skipped = &report.cases[1];
        assert_eq!(skipped.verdict, Verdict::Errored);
        assert!(skipped.error.as_deref().unwrap().contains("session unavailable"));
        assert!(skipped.failing_step.is_none());
    }
}
