//! SkySync Core
//!
//! Shared types for the SkySync log-upload agent: the persisted agent
//! configuration, the outbound status events, the externally supplied
//! control flags, and the core error type.
//!
//! This crate holds everything the agent and its collaborators need to
//! agree on; it performs no network or subprocess I/O itself.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod events;
pub mod flags;

// Re-export commonly used types
pub use config::{AgentConfig, RegistrationUpdate};
pub use error::{CoreError, Result};
pub use events::{unix_now, ReplyTo, StatusEvent};
pub use flags::ControlFlags;
