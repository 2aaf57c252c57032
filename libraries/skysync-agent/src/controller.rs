//! Sync controller
//!
//! The per-tick orchestration: refresh authentication, refresh file
//! observations, gate, authorize, transfer, then archive or report. One
//! tick performs at most one full cycle; the host re-enters the loop.
//!
//! At most one transfer is ever in flight, enforced structurally: the
//! subprocess handle lives on this function's stack for the duration of
//! the tick.

use crate::auth::Authenticator;
use crate::error::Result;
use crate::tracker::FileAgeTracker;
use crate::transfer::{Transfer, TransferOutcome, TransferSpec};
use crate::{emit, gate};
use skysync_client::CloudClient;
use skysync_core::{AgentConfig, ControlFlags, RegistrationUpdate, StatusEvent};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Inbound control messages delivered by the host framework.
#[derive(Debug)]
pub enum ControlMessage {
    /// Operator asked to (re-)register with new credential fields.
    Register(RegistrationUpdate),
}

/// What a tick did, for the host's pacing and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing eligible: no candidates, or the gate is closed. The
    /// dominant steady state when armed, offline, unauthenticated, or
    /// disabled.
    Idle,
    /// Candidates exist but upload authorization was not granted yet.
    NotReady,
    /// File transferred and archived.
    Completed(String),
    /// Transfer exited non-zero; file left in place for retry.
    Failed(String),
    /// Eligibility dropped mid-transfer; subprocess stopped, file left
    /// on disk for the next cycle to rediscover.
    Cancelled(String),
}

pub struct SyncController {
    cfg: AgentConfig,
    cfg_path: PathBuf,
    auth: Authenticator,
    tracker: FileAgeTracker,
    flags: watch::Receiver<ControlFlags>,
    events: mpsc::Sender<StatusEvent>,
}

impl SyncController {
    pub fn new(
        cfg: AgentConfig,
        cfg_path: PathBuf,
        flags: watch::Receiver<ControlFlags>,
        events: mpsc::Sender<StatusEvent>,
    ) -> Result<Self> {
        let client = CloudClient::new(cfg.base_url())?;
        let tracker = FileAgeTracker::new(Duration::from_secs(cfg.stable_secs));
        Ok(Self {
            cfg,
            cfg_path,
            auth: Authenticator::new(client),
            tracker,
            flags,
            events,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.cfg
    }

    /// Fresh flag snapshot with the persisted enabled switch folded in.
    fn flags_snapshot(&self) -> ControlFlags {
        let mut flags = *self.flags.borrow();
        flags.sync_enabled = flags.sync_enabled && self.cfg.sync_enabled;
        flags
    }

    fn eligible(&self) -> bool {
        let flags = self.flags_snapshot();
        gate::is_eligible(&flags, self.auth.is_authenticated(&self.cfg))
    }

    /// Handle an inbound control message from the host framework.
    pub async fn handle_message(&mut self, msg: ControlMessage) -> Result<()> {
        match msg {
            ControlMessage::Register(update) => {
                let flags = self.flags_snapshot();
                self.auth
                    .handle_registration(
                        &mut self.cfg,
                        &self.cfg_path,
                        &update,
                        &flags,
                        &self.events,
                    )
                    .await
            }
        }
    }

    /// One full cycle: Idle -> Authenticating -> Selecting -> Transferring
    /// -> Archiving | Reporting-Error -> Idle.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let now = SystemTime::now();
        let flags = self.flags_snapshot();

        // 1. authentication refresh (gated on reachability + enabled)
        self.auth
            .tick(&mut self.cfg, &self.cfg_path, &flags, now, &self.events)
            .await?;

        // 2. refresh observations; prune files that vanished externally
        let scan = self.tracker.scan(&self.cfg.log_dir, now)?;
        for name in &scan.missing {
            debug!(file = %name, "Tracked file disappeared; pruning");
            self.tracker.forget(name);
        }

        // 3. gate
        if scan.candidates.is_empty() || !self.eligible() {
            return Ok(TickOutcome::Idle);
        }

        // 4. upload authorization; a missing token just means "not ready"
        let Some(archive_folder) = self.auth.authorize_upload(&self.cfg).await else {
            return Ok(TickOutcome::NotReady);
        };

        // 5. select the oldest-modified candidate and stop tracking it so
        // it cannot be re-selected while the transfer is in flight
        let file_name = scan.candidates[0].name.clone();
        self.tracker.forget(&file_name);
        let source = self.cfg.log_dir.join(&file_name);

        // 6. start the transfer
        emit(&self.events, StatusEvent::starting(&file_name));
        let spec = TransferSpec::from_config(&self.cfg, source.clone());
        let mut transfer = Transfer::spawn(&spec)?;
        info!(file = %file_name, "Transfer started");

        // 7. stream progress while the gate holds; the gate is re-checked
        // on a fresh snapshot before every line read
        let mut held = true;
        loop {
            if !self.eligible() {
                held = false;
                break;
            }
            match transfer.next_line().await? {
                Some(line) => {
                    if let Some(p) = Transfer::parse_progress(&line) {
                        emit(
                            &self.events,
                            StatusEvent::progress(
                                &file_name,
                                p.data_sent,
                                p.percent_sent,
                                p.sending_rate,
                                p.time_remaining,
                            ),
                        );
                    }
                }
                None => break,
            }
        }

        // 8. outcome
        if !held {
            let state = transfer.shutdown().await;
            warn!(file = %file_name, ?state, "Transfer cancelled; file left for next cycle");
            return Ok(TickOutcome::Cancelled(file_name));
        }

        match transfer.wait().await? {
            TransferOutcome::Completed => {
                let archive_path = self.archive(&source, &archive_folder, &file_name)?;
                let msg = format!(
                    "{} - transfer complete. Original log archived at {}",
                    file_name,
                    archive_path.display()
                );
                emit(&self.events, StatusEvent::complete(&file_name, &msg));
                info!("{}", msg);
                Ok(TickOutcome::Completed(file_name))
            }
            TransferOutcome::Failed { exit_code, stderr } => {
                let msg = format!(
                    "{} - error during transfer. Exit code: {}. Error trace:\n{}",
                    file_name,
                    exit_code.map_or_else(|| "killed".to_string(), |c| c.to_string()),
                    stderr
                );
                emit(&self.events, StatusEvent::error(&file_name, &stderr, &msg));
                warn!("{}", msg);
                Ok(TickOutcome::Failed(file_name))
            }
        }
    }

    /// Move the transferred file into `<archive_dir>/<folder>/<file>`.
    fn archive(&self, source: &Path, folder: &str, file_name: &str) -> Result<PathBuf> {
        let target_dir = self.cfg.archive_dir.join(folder);
        fs::create_dir_all(&target_dir)?;
        let archive_path = target_dir.join(file_name);
        move_file(source, &archive_path)?;
        Ok(archive_path)
    }
}

/// Rename, with a copy+remove fallback for cross-device archive roots.
fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(source, dest)?;
            fs::remove_file(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_file_renames() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.bin");
        let dst = dir.path().join("b.bin");
        fs::write(&src, b"payload").unwrap();

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_disabled_config_closes_gate() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AgentConfig {
            sync_enabled: false,
            log_dir: dir.path().to_path_buf(),
            ..AgentConfig::default()
        };

        let (_flags_tx, flags_rx) = watch::channel(ControlFlags::all_clear());
        let (events_tx, _events_rx) = mpsc::channel(16);
        let controller =
            SyncController::new(cfg, dir.path().join("agent.toml"), flags_rx, events_tx).unwrap();

        let flags = controller.flags_snapshot();
        assert!(!flags.sync_enabled);
    }
}
