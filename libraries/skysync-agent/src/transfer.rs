//! Transfer supervisor
//!
//! Launches rsync for one file at a time, parses its progress stream, and
//! owns the forced-stop escalation. The command disables interactive
//! host-key prompts and restricts identity selection to the configured key
//! because this runs unattended.

use crate::error::{AgentError, Result};
use regex::Regex;
use skysync_core::AgentConfig;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{error, info};

/// How long to wait after each stop signal before escalating.
const STOP_TIMEOUT: Duration = Duration::from_millis(100);

/// rsync progress lines carry a `H:MM:SS` time-remaining token; that is
/// what distinguishes them from the rest of the verbose output.
fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]:([0-5][0-9]):([0-5][0-9])").expect("progress regex"))
}

/// Everything needed to build the rsync command line.
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub rsync_path: PathBuf,
    pub identity_file: PathBuf,
    pub port: u16,
    pub source: PathBuf,
    pub remote_user: String,
    pub remote_host: String,
    pub remote_dir: String,
}

impl TransferSpec {
    pub fn from_config(cfg: &AgentConfig, source: PathBuf) -> Self {
        Self {
            rsync_path: cfg.rsync_path.clone(),
            identity_file: cfg.identity_file.clone(),
            port: cfg.remote_port,
            source,
            remote_user: cfg.remote_user.clone(),
            remote_host: cfg.remote_host.clone(),
            remote_dir: cfg.remote_dir.clone(),
        }
    }

    /// The ssh transport argument: no host-key prompt, no ssh_config, no
    /// agent fallback, just the configured key and port.
    fn ssh_transport(&self) -> String {
        format!(
            "ssh -o IdentitiesOnly=yes -o StrictHostKeyChecking=no -F /dev/null -i {} -p {}",
            self.identity_file.display(),
            self.port
        )
    }

    fn destination(&self) -> String {
        format!(
            "{}@{}:{}",
            self.remote_user, self.remote_host, self.remote_dir
        )
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.rsync_path);
        cmd.arg("-ahHzv")
            .arg("--progress")
            .arg("-e")
            .arg(self.ssh_transport())
            .arg(&self.source)
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// One parsed progress record from the rsync output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub data_sent: String,
    pub percent_sent: String,
    pub sending_rate: String,
    pub time_remaining: String,
}

/// Terminal outcome of a transfer that ran to completion.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Exit code 0; the caller should archive the file.
    Completed,
    /// Non-zero exit; stderr text for reporting.
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Forced-stop escalation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Running,
    SignaledTerm,
    SignaledKill,
    /// Process exited and was reaped.
    Reaped,
    /// Still alive after TERM and KILL; no further attempts are made and
    /// the operator must address it.
    Stuck,
}

/// A supervised rsync subprocess.
pub struct Transfer {
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Option<ChildStderr>,
}

impl Transfer {
    /// Launch the subprocess described by the spec.
    pub fn spawn(spec: &TransferSpec) -> Result<Self> {
        let mut child = spec.command().spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Transfer("subprocess stdout not captured".to_string()))?;
        let stderr = child.stderr.take();
        info!(
            source = %spec.source.display(),
            dest = %spec.destination(),
            pid = child.id(),
            "rsync launched"
        );
        Ok(Self {
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr,
        })
    }

    /// Next line of the progress stream; `None` once the process closes
    /// its output.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.stdout.next_line().await?)
    }

    /// Recognize and tokenize a progress line.
    pub fn parse_progress(line: &str) -> Option<Progress> {
        if !progress_re().is_match(line) {
            return None;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return None;
        }
        Some(Progress {
            data_sent: fields[0].to_string(),
            percent_sent: fields[1].trim_end_matches('%').to_string(),
            sending_rate: fields[2].to_string(),
            time_remaining: fields[3].to_string(),
        })
    }

    /// Reap the process and classify its exit; stderr is drained
    /// concurrently so a chatty failure cannot wedge the pipe.
    pub async fn wait(&mut self) -> Result<TransferOutcome> {
        let stderr = self.stderr.take();
        let drain = async {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        };

        let (status, err_text) = tokio::join!(self.child.wait(), drain);
        let status = status?;

        if status.success() {
            Ok(TransferOutcome::Completed)
        } else {
            Ok(TransferOutcome::Failed {
                exit_code: status.code(),
                stderr: err_text,
            })
        }
    }

    /// Forcibly stop the subprocess: TERM, bounded wait, KILL, bounded
    /// wait, give up. Returns the terminal state reached.
    pub async fn shutdown(&mut self) -> StopState {
        let mut state = StopState::Running;
        loop {
            state = match state {
                StopState::Running => match self.child.id() {
                    Some(pid) => {
                        info!(pid, "Stopping transfer process");
                        signal(pid, libc::SIGTERM);
                        StopState::SignaledTerm
                    }
                    // already reaped
                    None => StopState::Reaped,
                },
                StopState::SignaledTerm => {
                    if self.reap_within(STOP_TIMEOUT).await {
                        StopState::Reaped
                    } else {
                        if let Some(pid) = self.child.id() {
                            signal(pid, libc::SIGKILL);
                        }
                        StopState::SignaledKill
                    }
                }
                StopState::SignaledKill => {
                    if self.reap_within(STOP_TIMEOUT).await {
                        StopState::Reaped
                    } else {
                        error!(
                            pid = self.child.id(),
                            "Failed to terminate and kill transfer process"
                        );
                        StopState::Stuck
                    }
                }
                terminal @ (StopState::Reaped | StopState::Stuck) => return terminal,
            };
        }
    }

    async fn reap_within(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.child.wait()).await,
            Ok(Ok(_))
        )
    }
}

fn signal(pid: u32, sig: i32) {
    // SAFETY: plain kill(2) on a pid we spawned; no memory is touched.
    unsafe {
        libc::kill(pid as i32, sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        let line = "      1,024 100%    1.21MB/s    0:00:00 (xfr#1, to-chk=0/1)";
        let progress = Transfer::parse_progress(line).unwrap();
        assert_eq!(progress.data_sent, "1,024");
        assert_eq!(progress.percent_sent, "100");
        assert_eq!(progress.sending_rate, "1.21MB/s");
        assert_eq!(progress.time_remaining, "0:00:00");
    }

    #[test]
    fn test_parse_mid_transfer_line() {
        let line = "  104,857,600  25%   11.89MB/s    0:00:25";
        let progress = Transfer::parse_progress(line).unwrap();
        assert_eq!(progress.percent_sent, "25");
        assert_eq!(progress.time_remaining, "0:00:25");
    }

    #[test]
    fn test_non_progress_lines_rejected() {
        assert!(Transfer::parse_progress("sending incremental file list").is_none());
        assert!(Transfer::parse_progress("log1.bin").is_none());
        assert!(Transfer::parse_progress("").is_none());
        // has a colon-separated token but out of MM:SS range
        assert!(Transfer::parse_progress("weird 9:99:99 token here").is_none());
    }

    #[test]
    fn test_command_line_shape() {
        let spec = TransferSpec {
            rsync_path: PathBuf::from("rsync"),
            identity_file: PathBuf::from("/home/pilot/.ssh/id_skysync"),
            port: 2222,
            source: PathBuf::from("/home/pilot/flightlogs/log1.bin"),
            remote_user: "skysync".to_string(),
            remote_host: "skysync.cloud".to_string(),
            remote_dir: "~".to_string(),
        };
        let transport = spec.ssh_transport();
        assert!(transport.contains("IdentitiesOnly=yes"));
        assert!(transport.contains("StrictHostKeyChecking=no"));
        assert!(transport.contains("-i /home/pilot/.ssh/id_skysync"));
        assert!(transport.contains("-p 2222"));
        assert_eq!(spec.destination(), "skysync@skysync.cloud:~");

        let cmd = spec.command();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-ahHzv");
        assert_eq!(args[1], "--progress");
        assert_eq!(args[2], "-e");
    }
}
