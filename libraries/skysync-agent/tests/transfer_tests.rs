//! Transfer supervisor tests using stand-in rsync scripts.


use skysync_agent::{StopState, Transfer, TransferOutcome, TransferSpec};
use std::path::PathBuf;
use std::time::Instant;
use test_helpers::{fake_rsync, init_tracing};

fn spec_for(script: PathBuf, dir: &std::path::Path) -> TransferSpec {
    TransferSpec {
        rsync_path: script,
        identity_file: dir.join("id_skysync"),
        port: 22,
        source: dir.join("log1.bin"),
        remote_user: "skysync".to_string(),
        remote_host: "skysync.cloud".to_string(),
        remote_dir: "~".to_string(),
    }
}

#[tokio::test]
async fn test_progress_lines_streamed_then_clean_exit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = fake_rsync(
        dir.path(),
        r#"echo "sending incremental file list"
echo "log1.bin"
echo "     524,288  50%    1.00MB/s    0:00:01"
echo "   1,048,576 100%    1.21MB/s    0:00:00 (xfr#1, to-chk=0/1)"
exit 0"#,
    );

    let mut transfer = Transfer::spawn(&spec_for(script, dir.path())).unwrap();
    let mut progress = Vec::new();
    while let Some(line) = transfer.next_line().await.unwrap() {
        if let Some(p) = Transfer::parse_progress(&line) {
            progress.push(p);
        }
    }

    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0].percent_sent, "50");
    assert_eq!(progress[1].percent_sent, "100");
    assert_eq!(progress[1].data_sent, "1,048,576");

    match transfer.wait().await.unwrap() {
        TransferOutcome::Completed => {}
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_nonzero_exit_captures_stderr() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = fake_rsync(
        dir.path(),
        r#"echo "ssh: connect to host skysync.cloud port 22: Connection refused" >&2
exit 255"#,
    );

    let mut transfer = Transfer::spawn(&spec_for(script, dir.path())).unwrap();
    while transfer.next_line().await.unwrap().is_some() {}

    match transfer.wait().await.unwrap() {
        TransferOutcome::Failed { exit_code, stderr } => {
            assert_eq!(exit_code, Some(255));
            assert!(stderr.contains("Connection refused"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_term_is_enough() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    // sleeps forever; dies on the first TERM
    let script = fake_rsync(dir.path(), "sleep 30");

    let mut transfer = Transfer::spawn(&spec_for(script, dir.path())).unwrap();
    let state = transfer.shutdown().await;
    assert_eq!(state, StopState::Reaped);
}

#[tokio::test]
async fn test_shutdown_escalates_to_kill() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    // ignores TERM; only KILL can take it down
    let script = fake_rsync(
        dir.path(),
        r#"trap '' TERM
i=0
while [ $i -lt 300 ]; do sleep 0.1; i=$((i+1)); done"#,
    );

    let mut transfer = Transfer::spawn(&spec_for(script, dir.path())).unwrap();
    // give the shell a moment to install its trap
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let started = Instant::now();
    let state = transfer.shutdown().await;
    assert_eq!(state, StopState::Reaped);
    // the TERM wait must have timed out before KILL was sent
    assert!(started.elapsed() >= std::time::Duration::from_millis(100));
}

#[tokio::test]
async fn test_shutdown_after_natural_exit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = fake_rsync(dir.path(), "exit 0");

    let mut transfer = Transfer::spawn(&spec_for(script, dir.path())).unwrap();
    while transfer.next_line().await.unwrap().is_some() {}

    // process already gone: shutdown reaps immediately
    assert_eq!(transfer.shutdown().await, StopState::Reaped);
}
