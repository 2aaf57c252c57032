//! File age tracker
//!
//! Watches a flat directory of log files by polling. A file becomes a sync
//! candidate once its size and modify-time have stayed unchanged longer
//! than the stability threshold; any change restarts the clock. The merge
//! step is factored out from the directory stat so tests can drive it with
//! synthetic listings and timestamps.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::trace;

/// One stat result from a directory listing.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Accumulated observation of one tracked file.
#[derive(Debug, Clone)]
struct FileObservation {
    size: u64,
    modified: SystemTime,
    /// When the current (size, modified) pair was first seen. Any change
    /// to either resets this to the poll time.
    first_seen: SystemTime,
}

/// A file judged stable long enough to transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCandidate {
    pub name: String,
    pub modified: SystemTime,
}

/// Result of one poll cycle.
#[derive(Debug, Default)]
pub struct DirScan {
    /// Stable files, oldest modify-time first.
    pub candidates: Vec<SyncCandidate>,
    /// Tracked names absent from the current listing. The tracker keeps
    /// them until the controller prunes each with [`FileAgeTracker::forget`];
    /// nothing decays silently.
    pub missing: Vec<String>,
}

/// Tracks per-file size/mtime observations across polls.
pub struct FileAgeTracker {
    entries: HashMap<String, FileObservation>,
    stable_after: Duration,
}

impl FileAgeTracker {
    pub fn new(stable_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stable_after,
        }
    }

    /// Stat the directory and merge into the observation set.
    pub fn scan(&mut self, dir: &Path, now: SystemTime) -> io::Result<DirScan> {
        let listing = list_dir(dir)?;
        Ok(self.merge(&listing, now))
    }

    /// Merge a listing into the observation set and compute candidates.
    ///
    /// Unchanged size+mtime carries `first_seen` forward so the age keeps
    /// growing; a new file, or any change, restarts the stability clock.
    pub fn merge(&mut self, listing: &[FileStat], now: SystemTime) -> DirScan {
        for stat in listing {
            match self.entries.get_mut(&stat.name) {
                Some(obs) => {
                    if obs.size != stat.size || obs.modified != stat.modified {
                        trace!(file = %stat.name, "File changed; stability clock reset");
                        obs.size = stat.size;
                        obs.modified = stat.modified;
                        obs.first_seen = now;
                    }
                }
                None => {
                    self.entries.insert(
                        stat.name.clone(),
                        FileObservation {
                            size: stat.size,
                            modified: stat.modified,
                            first_seen: now,
                        },
                    );
                }
            }
        }

        let missing: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !listing.iter().any(|s| &s.name == *name))
            .cloned()
            .collect();

        let mut candidates: Vec<SyncCandidate> = self
            .entries
            .iter()
            .filter(|(name, obs)| {
                if missing.iter().any(|m| m == *name) {
                    // A vanished file has no path to transfer from
                    return false;
                }
                let age = now
                    .duration_since(obs.first_seen)
                    .unwrap_or(Duration::ZERO);
                age > self.stable_after
            })
            .map(|(name, obs)| SyncCandidate {
                name: name.clone(),
                modified: obs.modified,
            })
            .collect();

        // Oldest modify-time first; name breaks ties for determinism
        candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then(a.name.cmp(&b.name)));

        DirScan {
            candidates,
            missing,
        }
    }

    /// Drop a file from the tracked set (selected for transfer, or pruned
    /// after disappearing from the directory).
    pub fn forget(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Number of tracked files.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    pub fn is_tracking(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Non-recursive listing of regular files with size and mtime.
fn list_dir(dir: &Path) -> io::Result<Vec<FileStat>> {
    let mut listing = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let metadata = entry.metadata()?;
        listing.push(FileStat {
            name,
            size: metadata.len(),
            modified: metadata.modified()?,
        });
    }
    Ok(listing)
}
