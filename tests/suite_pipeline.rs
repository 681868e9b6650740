//! End-to-end pipeline: suite file from disk, scripted console, JSON report.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use simtest_client::{Session, SessionConfig, Transport};
use simtest_runner::{ScenarioRunner, Suite, SuiteReport};

const SUITE: &str = r#"
name: boot-smoke
defaults:
  stream: uart0
  timeout-secs: 5
setup:
  - load-platform: conf/board.repl
  - load-binary: bin/app.elf
teardown:
  - pause
cases:
  - name: greets-and-prompts
    steps:
      - start
      - wait-for-line: { text: "Hello, World!" }
      - wait-for-prompt: { prompt: "main>" }
      - write-line: { text: "1" }
      - wait-for-prompt: { prompt: "models>" }
"#;

/// Minimal scripted console for the far end of a duplex transport.
fn scripted_console(io: DuplexStream) -> Arc<Mutex<Vec<String>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);
    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(io);
        let mut lines = BufReader::new(read).lines();
        if write.write_all(b"(monitor)\n").await.is_err() {
            return;
        }
        while let Ok(Some(cmd)) = lines.next_line().await {
            log.lock().unwrap().push(cmd.clone());
            if cmd == "quit" {
                return;
            }
            let replies: &[&str] = if cmd == "start" {
                &["[uart0] Hello, World!", "[uart0] app main>"]
            } else if cmd.starts_with("uart0 WriteLine") {
                &["[uart0] loading models", "[uart0] models>"]
            } else {
                &[]
            };
            for reply in replies {
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

#[tokio::test]
async fn test_suite_file_to_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let suite_path = dir.path().join("boot.yaml");
    std::fs::write(&suite_path, SUITE).unwrap();
    let suite = Suite::from_file(&suite_path).unwrap();

    let (client, server) = tokio::io::duplex(4096);
    let received = scripted_console(server);
    let (read, write) = tokio::io::split(client);
    let mut session = Session::attach(SessionConfig::tcp("unused:0"), Transport::from_io(read, write))
        .await
        .unwrap();

    let report = ScenarioRunner::new().run_suite(&mut session, &suite).await;
    session.shutdown().await;

    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.errored, 0);
    assert_eq!(report.exit_code(), 0);

    // The console saw the whole scripted conversation, in order.
    {
        let log = received.lock().unwrap();
        assert_eq!(
            log.as_slice(),
            [
                "machine LoadPlatformDescription @conf/board.repl",
                "sysbus LoadELF @bin/app.elf",
                "start",
                "uart0 WriteLine \"1\"",
                "pause",
                "quit",
            ]
        );
    }

    // Report round-trips through the file format CI consumes.
    let report_path = dir.path().join("report.json");
    report.write_json(&report_path).unwrap();
    let parsed: SuiteReport =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(parsed.suite, "boot-smoke");
    assert_eq!(parsed.cases.len(), 1);
    assert_eq!(parsed.cases[0].name, "greets-and-prompts");
}
