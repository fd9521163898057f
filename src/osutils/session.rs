//! Privileges, logon sessions and restart
//!
//! A [`LogonSession`] owns its token and, when requested, the loaded user
//! profile. Both are released exactly once, when the session is closed or
//! dropped, profile first.

use crate::OsError;
use crate::platform::{RawHandle, SecurityApi, Sid};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Privilege required to restart the machine
pub const SHUTDOWN_PRIVILEGE: &str = "SeShutdownPrivilege";

/// Domain used for local accounts
pub const LOCAL_DOMAIN: &str = ".";

/// Interactive logon session, optionally with its profile loaded
pub struct LogonSession {
    security: Arc<dyn SecurityApi>,
    username: String,
    token: RawHandle,
    profile: Option<RawHandle>,
    released: bool,
}

impl LogonSession {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Session token
    pub fn token(&self) -> RawHandle {
        self.token
    }

    /// Loaded profile handle, if one was requested
    pub fn profile(&self) -> Option<RawHandle> {
        self.profile
    }

    /// Release the session now and report any failure
    pub fn close(mut self) -> Result<(), OsError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), OsError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let unloaded = match self.profile.take() {
            Some(profile) => self.security.unload_user_profile(self.token, profile),
            None => Ok(()),
        };
        let closed = self.security.close_handle(self.token);
        debug!("Closed logon session for {}", self.username);

        unloaded.and(closed)
    }
}

impl Drop for LogonSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release logon session for {}: {}", self.username, e);
        }
    }
}

impl std::fmt::Debug for LogonSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogonSession")
            .field("username", &self.username)
            .field("token", &self.token)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Token privileges, logon and restart
#[derive(Clone)]
pub struct SessionManager {
    security: Arc<dyn SecurityApi>,
    reboot_message: String,
}

impl SessionManager {
    pub fn new(security: Arc<dyn SecurityApi>, reboot_message: impl Into<String>) -> Self {
        Self {
            security,
            reboot_message: reboot_message.into(),
        }
    }

    /// Enable the shutdown privilege on the current process token
    pub fn enable_shutdown_privilege(&self) -> Result<(), OsError> {
        self.security.enable_privilege(SHUTDOWN_PRIVILEGE)?;
        debug!("Enabled {}", SHUTDOWN_PRIVILEGE);
        Ok(())
    }

    /// Request an immediate, forced restart
    ///
    /// On a real host this returns shortly before the machine goes down.
    /// Callers must not assume they keep running afterwards.
    pub fn reboot(&self) -> Result<(), OsError> {
        self.enable_shutdown_privilege()?;
        info!("Requesting system restart");
        self.security.initiate_reboot(&self.reboot_message)
    }

    /// Log `username` on interactively, optionally loading the profile
    ///
    /// If the profile cannot be loaded the token is closed before the error
    /// is returned.
    pub fn create_logon_session(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
        load_profile: bool,
    ) -> Result<LogonSession, OsError> {
        let domain = domain.unwrap_or(LOCAL_DOMAIN);
        let token = self.security.logon_user(username, domain, password)?;

        let profile = if load_profile {
            match self.security.load_user_profile(token, username) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    if let Err(close_err) = self.security.close_handle(token) {
                        warn!("Failed to close token for {}: {}", username, close_err);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        debug!("Created logon session for {}\\{}", domain, username);
        Ok(LogonSession {
            security: Arc::clone(&self.security),
            username: username.to_string(),
            token,
            profile,
            released: false,
        })
    }

    /// Release a session created by [`Self::create_logon_session`]
    pub fn close_logon_session(&self, session: LogonSession) -> Result<(), OsError> {
        session.close()
    }

    /// Resolve an account name to its SID and domain
    pub fn sid_and_domain(&self, username: &str) -> Result<(Sid, String), OsError> {
        self.security
            .lookup_account(username)?
            .ok_or_else(|| OsError::AccountLookup(username.to_string()))
    }
}
