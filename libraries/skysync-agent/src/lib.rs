//! SkySync Agent
//!
//! The sync controller for the SkySync log-upload agent. Each tick it
//! refreshes the authentication state against the cloud service, decides
//! which log files have been stable long enough to transfer, and drives a
//! single rsync subprocess per cycle, archiving the file locally once the
//! transfer is verified.
//!
//! The controller is cooperative: the host invokes [`SyncController::tick`]
//! repeatedly, and cancellation mid-transfer happens through the
//! [`skysync_core::ControlFlags`] watch channel, checked once per
//! subprocess output line.

mod auth;
mod controller;
mod error;
mod gate;
mod tracker;
mod transfer;

// Public exports
pub use auth::{AuthStatus, Authenticator, DEFAULT_REMINDER_INTERVAL};
pub use controller::{ControlMessage, SyncController, TickOutcome};
pub use error::{AgentError, Result};
pub use gate::is_eligible;
pub use tracker::{DirScan, FileAgeTracker, FileStat, SyncCandidate};
pub use transfer::{Progress, StopState, Transfer, TransferOutcome, TransferSpec};

use skysync_core::StatusEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Push an event to the sink without blocking the tick loop; a lagging
/// consumer loses events rather than stalling a transfer.
pub(crate) fn emit(events: &mpsc::Sender<StatusEvent>, event: StatusEvent) {
    if let Err(e) = events.try_send(event) {
        warn!("Dropping status event: {}", e);
    }
}
