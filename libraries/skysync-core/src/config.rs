//! Persisted agent configuration
//!
//! Loaded from a TOML file plus `SKYSYNC_`-prefixed environment overrides,
//! and written back whenever registration state changes. The save path is
//! atomic (temp file + rename) so the registration flag and the identity
//! fields never land on disk half-updated.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Master switch for the sync loop
    #[serde(default = "default_sync_enabled")]
    pub sync_enabled: bool,

    /// SSH port on the cloud endpoint
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// SSH user on the cloud endpoint
    #[serde(default = "default_remote_user")]
    pub remote_user: String,

    /// Cloud endpoint hostname (also the HTTPS API host)
    #[serde(default = "default_remote_host")]
    pub remote_host: String,

    /// Explicit API base URL; overrides the default `https://<remote_host>/`
    #[serde(default)]
    pub api_url: Option<String>,

    /// Whether this agent's key has been registered with the service
    #[serde(default)]
    pub registered: bool,

    /// SSH private key; the matching `.pub` is what gets registered
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,

    /// Assigned by the service once the account is verified
    #[serde(default)]
    pub vehicle_id: Option<String>,

    /// Assigned by the service once the account is verified
    #[serde(default)]
    pub user_id: Option<String>,

    /// Contact address used during registration
    #[serde(default = "default_email")]
    pub email: String,

    /// Remote base directory rsync writes into
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Directory watched for new log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Local archive root for transferred logs
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Seconds a file's size/mtime must stay unchanged before syncing
    #[serde(default = "default_stable_secs")]
    pub stable_secs: u64,

    /// rsync binary (overridable for packaging and tests)
    #[serde(default = "default_rsync_path")]
    pub rsync_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sync_enabled: default_sync_enabled(),
            remote_port: default_remote_port(),
            remote_user: default_remote_user(),
            remote_host: default_remote_host(),
            api_url: None,
            registered: false,
            identity_file: default_identity_file(),
            vehicle_id: None,
            user_id: None,
            email: default_email(),
            remote_dir: default_remote_dir(),
            log_dir: default_log_dir(),
            archive_dir: default_archive_dir(),
            stable_secs: default_stable_secs(),
            rsync_path: default_rsync_path(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from file and environment
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = config::Config::builder();

        if path.exists() {
            settings = settings.add_source(config::File::from(path.to_path_buf()));
        }

        // Override with environment variables (prefixed with SKYSYNC_)
        settings = settings.add_source(
            config::Environment::with_prefix("SKYSYNC")
                .separator("__")
                .try_parsing(true),
        );

        let settings = settings
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Persist the configuration atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.remote_host.is_empty() {
            return Err(CoreError::Config("remote_host is required".to_string()));
        }
        if self.stable_secs == 0 {
            return Err(CoreError::Config(
                "stable_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL of the cloud service API
    pub fn base_url(&self) -> String {
        match &self.api_url {
            Some(url) => url.clone(),
            None => format!("https://{}/", self.remote_host),
        }
    }

    /// Path of the public half of the identity key
    pub fn public_key_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.pub", self.identity_file.display()))
    }

    /// Merge an inbound registration request into the config
    pub fn apply_registration(&mut self, update: &RegistrationUpdate) {
        if let Some(email) = &update.email {
            self.email = email.clone();
        }
        if let Some(host) = &update.remote_host {
            self.remote_host = host.clone();
        }
        if let Some(port) = update.remote_port {
            self.remote_port = port;
        }
        if let Some(user) = &update.remote_user {
            self.remote_user = user.clone();
        }
        if let Some(identity) = &update.identity_file {
            self.identity_file = identity.clone();
        }
    }
}

/// Fields an inbound registration-request message may carry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationUpdate {
    pub email: Option<String>,
    pub remote_host: Option<String>,
    pub remote_port: Option<u16>,
    pub remote_user: Option<String>,
    pub identity_file: Option<PathBuf>,
}

// Default values

fn default_sync_enabled() -> bool {
    true
}

fn default_remote_port() -> u16 {
    22
}

fn default_remote_user() -> String {
    "skysync".to_string()
}

fn default_remote_host() -> String {
    "skysync.cloud".to_string()
}

fn default_identity_file() -> PathBuf {
    home_dir().join(".ssh").join("id_skysync")
}

fn default_email() -> String {
    "example@example.com".to_string()
}

fn default_remote_dir() -> String {
    "~".to_string()
}

fn default_log_dir() -> PathBuf {
    home_dir().join("flightlogs")
}

fn default_archive_dir() -> PathBuf {
    home_dir().join("flightlogs").join("archive")
}

fn default_stable_secs() -> u64 {
    3
}

fn default_rsync_path() -> PathBuf {
    PathBuf::from("rsync")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
