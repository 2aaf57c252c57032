//! End-to-end controller tests: mock cloud service plus stand-in rsync.


use skysync_agent::{SyncController, TickOutcome};
use skysync_core::{ControlFlags, StatusEvent};
use std::fs;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use wiremock::MockServer;

use test_helpers::{
    drain, fake_rsync, mount_session, mount_upload, mount_verified, statuses, test_env, TestEnv,
};

struct Harness {
    env: TestEnv,
    controller: SyncController,
    flags_tx: watch::Sender<ControlFlags>,
    events_rx: mpsc::Receiver<StatusEvent>,
}

async fn harness(server: &MockServer, rsync_body: &str) -> Harness {
    mount_session(server).await;
    mount_verified(server).await;
    mount_upload(server, "uploads-2026").await;

    let mut env = test_env(&server.uri());
    env.cfg.registered = true;
    env.cfg.rsync_path = fake_rsync(env.dir.path(), rsync_body);
    fs::write(env.cfg.log_dir.join("log1.bin"), b"flight data").unwrap();

    let (flags_tx, flags_rx) = watch::channel(ControlFlags::all_clear());
    let (events_tx, events_rx) = mpsc::channel(32);
    let controller = SyncController::new(
        env.cfg.clone(),
        env.cfg_path.clone(),
        flags_rx,
        events_tx,
    )
    .unwrap();

    Harness {
        env,
        controller,
        flags_tx,
        events_rx,
    }
}

/// First tick only observes the new file; stability takes `stable_secs`.
async fn tick_until_stable(h: &mut Harness) {
    assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Idle);
    tokio::time::sleep(Duration::from_millis(1200)).await;
}

#[tokio::test]
async fn test_full_cycle_archives_file() {
    let server = MockServer::start().await;
    let mut h = harness(
        &server,
        r#"echo "log1.bin"
echo "         11 100%   10.74kB/s    0:00:00 (xfr#1, to-chk=0/1)"
exit 0"#,
    )
    .await;

    tick_until_stable(&mut h).await;
    assert_eq!(
        h.controller.tick().await.unwrap(),
        TickOutcome::Completed("log1.bin".to_string())
    );

    // original gone, archived copy intact under the granted folder
    assert!(!h.env.cfg.log_dir.join("log1.bin").exists());
    let archived = h.env.cfg.archive_dir.join("uploads-2026").join("log1.bin");
    assert_eq!(fs::read(&archived).unwrap(), b"flight data");

    // verified notice from the first tick, then the transfer sequence
    let events = drain(&mut h.events_rx);
    assert_eq!(
        statuses(&events),
        vec!["notice", "starting", "progress", "complete"]
    );

    // archived file is not rediscovered
    assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test]
async fn test_failed_transfer_leaves_file_in_place() {
    let server = MockServer::start().await;
    let mut h = harness(
        &server,
        r#"echo "rsync error: unexplained error" >&2
exit 23"#,
    )
    .await;

    tick_until_stable(&mut h).await;
    assert_eq!(
        h.controller.tick().await.unwrap(),
        TickOutcome::Failed("log1.bin".to_string())
    );

    assert!(h.env.cfg.log_dir.join("log1.bin").exists());
    assert!(!h.env.cfg.archive_dir.join("uploads-2026").exists());

    let events = drain(&mut h.events_rx);
    assert_eq!(statuses(&events), vec!["notice", "starting", "error"]);
    let last = serde_json::to_value(events.last().unwrap()).unwrap();
    assert!(last["error"]
        .as_str()
        .unwrap()
        .contains("unexplained error"));
}

#[tokio::test]
async fn test_gate_drop_cancels_mid_transfer() {
    let server = MockServer::start().await;
    let mut h = harness(
        &server,
        r#"i=0
while [ $i -lt 50 ]; do
  echo "chunk $i"
  sleep 0.2
  i=$((i+1))
done"#,
    )
    .await;

    tick_until_stable(&mut h).await;

    let flags_tx = h.flags_tx;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        let mut flags = ControlFlags::all_clear();
        flags.unload_requested = true;
        let _ = flags_tx.send(flags);
    });

    assert_eq!(
        h.controller.tick().await.unwrap(),
        TickOutcome::Cancelled("log1.bin".to_string())
    );

    // nothing archived; the file waits for the next cycle
    assert!(h.env.cfg.log_dir.join("log1.bin").exists());
    assert!(!h.env.cfg.archive_dir.join("uploads-2026").exists());
}

#[tokio::test]
async fn test_missing_upload_grant_means_not_ready() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_verified(&server).await;
    // no /upload mock: authorization is refused

    let mut env = test_env(&server.uri());
    env.cfg.registered = true;
    env.cfg.rsync_path = fake_rsync(env.dir.path(), "exit 0");
    fs::write(env.cfg.log_dir.join("log1.bin"), b"flight data").unwrap();

    let (_flags_tx, flags_rx) = watch::channel(ControlFlags::all_clear());
    let (events_tx, _events_rx) = mpsc::channel(32);
    let mut controller =
        SyncController::new(env.cfg.clone(), env.cfg_path.clone(), flags_rx, events_tx).unwrap();

    assert_eq!(controller.tick().await.unwrap(), TickOutcome::Idle);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(controller.tick().await.unwrap(), TickOutcome::NotReady);
    assert!(env.cfg.log_dir.join("log1.bin").exists());
}

#[tokio::test]
async fn test_closed_gate_skips_transfer_entirely() {
    let server = MockServer::start().await;
    let mut h = harness(&server, "exit 0").await;

    // armed vehicle: gate closed even though a candidate exists
    let mut flags = ControlFlags::all_clear();
    flags.disarmed = false;
    h.flags_tx.send(flags).unwrap();

    tick_until_stable(&mut h).await;
    assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Idle);
    assert!(h.env.cfg.log_dir.join("log1.bin").exists());
}
