//! Eligibility gate
//!
//! The combined precondition for starting or continuing a transfer, as a
//! pure function of the externally supplied flags plus the authentication
//! state. The controller re-evaluates this on a fresh flag snapshot before
//! every subprocess output-line read, so any flip cancels an in-flight
//! transfer within one line's latency.

use skysync_core::ControlFlags;

/// All five conditions must hold for any transfer to start or continue:
/// vehicle disarmed, cloud reachable, syncing enabled, no unload pending,
/// and a verified account with a live session.
pub fn is_eligible(flags: &ControlFlags, authenticated: bool) -> bool {
    flags.disarmed
        && flags.reachable
        && flags.sync_enabled
        && !flags.unload_requested
        && authenticated
}
