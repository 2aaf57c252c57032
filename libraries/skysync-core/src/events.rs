//! Outbound status events
//!
//! Everything the agent tells the outside world goes through these records.
//! They serialize to the JSON shape the downstream presentation consumer
//! expects: a `status` tag, a `replyto` routing key, and a `current_time`
//! unix-seconds timestamp.

use chrono::Utc;
use serde::Serialize;

/// Routing key telling the consumer which UI surface an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplyTo {
    /// Registration / verification notices
    #[serde(rename = "syncRegister")]
    SyncRegister,
    /// Per-file transfer updates
    #[serde(rename = "syncUpdate")]
    SyncUpdate,
}

/// A status record emitted by the sync controller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Registration or verification notice for the operator
    Notice {
        message: String,
        current_time: f64,
        replyto: ReplyTo,
    },
    /// A transfer is about to begin
    Starting {
        percent_sent: String,
        current_time: f64,
        file: String,
        replyto: ReplyTo,
    },
    /// Parsed rsync progress line
    Progress {
        data_sent: String,
        percent_sent: String,
        sending_rate: String,
        time_remaining: String,
        current_time: f64,
        file: String,
        replyto: ReplyTo,
    },
    /// Transfer finished and the file was archived locally
    Complete {
        percent_sent: String,
        current_time: f64,
        file: String,
        message: String,
        replyto: ReplyTo,
    },
    /// Transfer failed; the file stays in place for retry
    Error {
        error: String,
        current_time: f64,
        file: String,
        message: String,
        replyto: ReplyTo,
    },
}

impl StatusEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice {
            message: message.into(),
            current_time: unix_now(),
            replyto: ReplyTo::SyncRegister,
        }
    }

    pub fn starting(file: impl Into<String>) -> Self {
        Self::Starting {
            percent_sent: "0".to_string(),
            current_time: unix_now(),
            file: file.into(),
            replyto: ReplyTo::SyncUpdate,
        }
    }

    pub fn progress(
        file: impl Into<String>,
        data_sent: impl Into<String>,
        percent_sent: impl Into<String>,
        sending_rate: impl Into<String>,
        time_remaining: impl Into<String>,
    ) -> Self {
        Self::Progress {
            data_sent: data_sent.into(),
            percent_sent: percent_sent.into(),
            sending_rate: sending_rate.into(),
            time_remaining: time_remaining.into(),
            current_time: unix_now(),
            file: file.into(),
            replyto: ReplyTo::SyncUpdate,
        }
    }

    pub fn complete(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Complete {
            percent_sent: "100".to_string(),
            current_time: unix_now(),
            file: file.into(),
            message: message.into(),
            replyto: ReplyTo::SyncUpdate,
        }
    }

    pub fn error(
        file: impl Into<String>,
        error: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Error {
            error: error.into(),
            current_time: unix_now(),
            file: file.into(),
            message: message.into(),
            replyto: ReplyTo::SyncUpdate,
        }
    }

    /// The routing key of this event
    pub fn replyto(&self) -> ReplyTo {
        match self {
            Self::Notice { replyto, .. }
            | Self::Starting { replyto, .. }
            | Self::Progress { replyto, .. }
            | Self::Complete { replyto, .. }
            | Self::Error { replyto, .. } => *replyto,
        }
    }
}

/// Current wall-clock time as fractional unix seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_serializes_with_routing() {
        let event = StatusEvent::notice("account verified");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "notice");
        assert_eq!(json["replyto"], "syncRegister");
        assert_eq!(json["message"], "account verified");
        assert!(json["current_time"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_starting_has_zero_percent() {
        let event = StatusEvent::starting("log1.bin");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "starting");
        assert_eq!(json["percent_sent"], "0");
        assert_eq!(json["file"], "log1.bin");
        assert_eq!(json["replyto"], "syncUpdate");
    }

    #[test]
    fn test_complete_has_full_percent() {
        let event = StatusEvent::complete("log1.bin", "archived");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "complete");
        assert_eq!(json["percent_sent"], "100");
    }

    #[test]
    fn test_error_carries_stderr_text() {
        let event = StatusEvent::error("log1.bin", "connection refused", "rsync failed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "connection refused");
        assert_eq!(json["message"], "rsync failed");
    }
}
