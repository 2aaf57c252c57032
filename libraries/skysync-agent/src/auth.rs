//! Authentication state machine
//!
//! Tracks registration and verification against the cloud service:
//! `Unregistered -> Registered -> Verified`. Registration happens on an
//! explicit operator request; verification is polled each tick while a
//! session exists. Remote-call failures leave the state untouched and are
//! retried next tick. "Needs verification" reminders are rate-limited.

use crate::error::Result;
use crate::{emit, gate};
use skysync_client::{
    compute_fingerprint, fingerprint_b64, fingerprint_hex, public_key_b64, CloudClient, Session,
};
use skysync_core::{AgentConfig, ControlFlags, RegistrationUpdate, StatusEvent};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Minimum interval between repeated "needs verification" notices.
pub const DEFAULT_REMINDER_INTERVAL: Duration = Duration::from_secs(120);

/// Where the agent stands with the cloud service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unregistered,
    /// Registered but the operator has not confirmed the email link yet.
    Registered,
    Verified,
}

/// Cached identity material, payload-encoded.
#[derive(Debug, Clone)]
struct Credentials {
    public_key_b64: String,
    fingerprint_b64: String,
}

fn load_credentials(cfg: &AgentConfig) -> skysync_client::Result<Credentials> {
    let pub_path = cfg.public_key_path();
    let digest = compute_fingerprint(&pub_path)?;
    debug!(fingerprint = %fingerprint_hex(&digest), "Loaded identity key");
    Ok(Credentials {
        public_key_b64: public_key_b64(&pub_path)?,
        fingerprint_b64: fingerprint_b64(&pub_path)?,
    })
}

pub struct Authenticator {
    client: CloudClient,
    session: Option<Session>,
    verified: bool,
    credentials: Option<Credentials>,
    last_reminder: Option<SystemTime>,
    reminder_interval: Duration,
}

impl Authenticator {
    pub fn new(client: CloudClient) -> Self {
        Self {
            client,
            session: None,
            verified: false,
            credentials: None,
            last_reminder: None,
            reminder_interval: DEFAULT_REMINDER_INTERVAL,
        }
    }

    pub fn with_reminder_interval(mut self, interval: Duration) -> Self {
        self.reminder_interval = interval;
        self
    }

    pub fn status(&self, cfg: &AgentConfig) -> AuthStatus {
        if !cfg.registered {
            AuthStatus::Unregistered
        } else if self.verified {
            AuthStatus::Verified
        } else {
            AuthStatus::Registered
        }
    }

    /// Verified account with a live session: the authentication half of
    /// the eligibility gate.
    pub fn is_authenticated(&self, cfg: &AgentConfig) -> bool {
        self.session.is_some() && cfg.registered && self.verified
    }

    /// Handle an inbound registration request.
    ///
    /// Merges the new credential fields into the config, recomputes the
    /// identity fingerprint, and attempts the remote registration round
    /// trip. The registered flag and the persisted config always commit
    /// together; the flag is never true without a success response.
    pub async fn handle_registration(
        &mut self,
        cfg: &mut AgentConfig,
        cfg_path: &Path,
        update: &RegistrationUpdate,
        flags: &ControlFlags,
        events: &mpsc::Sender<StatusEvent>,
    ) -> Result<()> {
        cfg.apply_registration(update);

        if update.remote_host.is_some() {
            self.client = CloudClient::new(cfg.base_url())?;
        }

        // identity may have changed
        self.credentials = None;
        match load_credentials(cfg) {
            Ok(creds) => self.credentials = Some(creds),
            Err(e) => warn!("Cannot load identity key: {}", e),
        }

        if flags.reachable {
            match self.client.open_session().await {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    debug!("Session open failed during registration: {}", e);
                    self.session = None;
                }
            }
        }

        if let (Some(session), Some(creds)) = (self.session.clone(), self.credentials.clone()) {
            match self
                .client
                .register(
                    &session,
                    &cfg.email,
                    &creds.public_key_b64,
                    &creds.fingerprint_b64,
                )
                .await
            {
                Ok(response) => {
                    cfg.registered = true;
                    cfg.save(cfg_path)?;
                    emit(events, StatusEvent::notice(response.msg));
                    info!("Cloud registration attempt successful");
                    return Ok(());
                }
                Err(e) => warn!("Cloud registration rejected: {}", e),
            }
        }

        cfg.registered = false;
        cfg.save(cfg_path)?;
        emit(
            events,
            StatusEvent::notice("Registration with cloud service failed"),
        );
        info!("Cloud registration attempt failed");
        Ok(())
    }

    /// Periodic verification poll.
    ///
    /// Opens a fresh session (the service rotates the XSRF cookie) and, if
    /// registered but not yet verified, asks the service. A negative
    /// answer never regresses the registered flag; it only schedules a
    /// rate-limited reminder for the operator.
    pub async fn tick(
        &mut self,
        cfg: &mut AgentConfig,
        cfg_path: &Path,
        flags: &ControlFlags,
        now: SystemTime,
        events: &mpsc::Sender<StatusEvent>,
    ) -> Result<()> {
        if !flags.reachable || !flags.sync_enabled {
            return Ok(());
        }

        match self.client.open_session().await {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                debug!("Session open failed: {}", e);
                self.session = None;
                return Ok(());
            }
        }

        if !cfg.registered || self.verified {
            return Ok(());
        }

        let Some(session) = self.session.clone() else {
            return Ok(());
        };
        let fingerprint = match self.credentials(cfg) {
            Ok(creds) => creds.fingerprint_b64,
            Err(e) => {
                debug!("Cannot load identity key for verification: {}", e);
                return Ok(());
            }
        };

        match self.client.verify(&session, &fingerprint).await {
            Ok(response) if response.verify => {
                cfg.vehicle_id = response.vehicle_id;
                cfg.user_id = response.user_id;
                self.verified = true;
                cfg.save(cfg_path)?;
                emit(events, StatusEvent::notice(response.msg));
                info!("Cloud account verified");
            }
            Ok(response) => {
                self.verified = false;
                cfg.save(cfg_path)?;
                if self.reminder_due(now) {
                    emit(events, StatusEvent::notice(response.msg));
                    self.last_reminder = Some(now);
                    info!(
                        "Cloud credentials need to be verified; check the link sent to {}",
                        cfg.email
                    );
                }
            }
            // try again next tick
            Err(e) => debug!("Verification call failed: {}", e),
        }

        Ok(())
    }

    /// Ask for upload authorization. `None` means "not ready yet", never a
    /// hard error.
    pub async fn authorize_upload(&mut self, cfg: &AgentConfig) -> Option<String> {
        let session = self.session.clone()?;
        let fingerprint = match self.credentials(cfg) {
            Ok(creds) => creds.fingerprint_b64,
            Err(e) => {
                debug!("Cannot load identity key for upload: {}", e);
                return None;
            }
        };
        match self.client.request_upload(&session, &fingerprint).await {
            Ok(response) => {
                debug!(archive_folder = %response.archive_folder, "Upload authorized");
                Some(response.archive_folder)
            }
            Err(e) => {
                debug!("Upload authorization failed: {}", e);
                None
            }
        }
    }

    /// Whether the gate currently passes for this auth state.
    pub fn eligible(&self, cfg: &AgentConfig, flags: &ControlFlags) -> bool {
        gate::is_eligible(flags, self.is_authenticated(cfg))
    }

    fn credentials(&mut self, cfg: &AgentConfig) -> skysync_client::Result<Credentials> {
        if let Some(creds) = &self.credentials {
            return Ok(creds.clone());
        }
        let creds = load_credentials(cfg)?;
        self.credentials = Some(creds.clone());
        Ok(creds)
    }

    /// "Next notice no earlier than last + interval."
    fn reminder_due(&self, now: SystemTime) -> bool {
        match self.last_reminder {
            None => true,
            Some(last) => now >= last + self.reminder_interval,
        }
    }
}
