//! Externally supplied eligibility inputs
//!
//! The host framework owns these booleans (arm state from the autopilot,
//! reachability from the network module, the enabled switch from the UI,
//! unload from the module loader). The agent only ever reads a snapshot;
//! updates arrive through a `tokio::sync::watch` channel so a flip is
//! visible mid-transfer within one output-line read.

/// Snapshot of the control inputs the eligibility gate consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlags {
    /// Vehicle is known to be disarmed
    pub disarmed: bool,
    /// An internet-facing route to the cloud exists
    pub reachable: bool,
    /// Operator-level sync switch
    pub sync_enabled: bool,
    /// Host framework asked the agent to unload
    pub unload_requested: bool,
}

impl Default for ControlFlags {
    /// Arm state and reachability are unknown on load, so both start
    /// pessimistic; syncing is enabled unless configured off.
    fn default() -> Self {
        Self {
            disarmed: false,
            reachable: false,
            sync_enabled: true,
            unload_requested: false,
        }
    }
}

impl ControlFlags {
    /// Convenience for tests and the standalone binary: everything go.
    pub fn all_clear() -> Self {
        Self {
            disarmed: true,
            reachable: true,
            sync_enabled: true,
            unload_requested: false,
        }
    }
}
