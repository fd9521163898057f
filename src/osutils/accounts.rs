//! Local user accounts
//!
//! Accounts are created and their passwords changed with `NET USER`; the
//! directory service is used for lookups, the password-expiration flag and
//! group membership.

use crate::OsError;
use crate::escape;
use crate::platform::{AccountDirectory, Registry, RegistryValue, Sid};
use crate::process::{CommandLine, ProcessExecutor};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry key mapping SIDs to profile directories
pub const PROFILE_LIST_KEY: &str = "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\ProfileList";

const PROFILE_IMAGE_PATH: &str = "ProfileImagePath";

// NetLocalGroupAddMembers return values
const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_MEMBER_IN_ALIAS: u32 = 1378;
const ERROR_NO_SUCH_MEMBER: u32 = 1387;
const ERROR_INVALID_MEMBER: u32 = 1388;
const NERR_GROUP_NOT_FOUND: u32 = 2220;

/// Creates and modifies local user accounts
#[derive(Clone)]
pub struct UserAccountManager {
    directory: Arc<dyn AccountDirectory>,
    process: Arc<dyn ProcessExecutor>,
    registry: Arc<dyn Registry>,
}

impl UserAccountManager {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        process: Arc<dyn ProcessExecutor>,
        registry: Arc<dyn Registry>,
    ) -> Self {
        Self {
            directory,
            process,
            registry,
        }
    }

    /// Whether an account with this name exists
    pub async fn exists(&self, name: &str) -> Result<bool, OsError> {
        Ok(self.directory.find_account(name).await?.is_some())
    }

    /// Create a local account
    ///
    /// Fails with [`OsError::AccountOperation`] if the account already exists.
    pub async fn create(
        &self,
        name: &str,
        password: &str,
        password_expires: bool,
    ) -> Result<(), OsError> {
        self.create_or_update(name, password, password_expires, true)
            .await?;
        info!("Created user {}", name);
        Ok(())
    }

    /// Change the password of an existing account
    pub async fn set_password(
        &self,
        name: &str,
        password: &str,
        password_expires: bool,
    ) -> Result<(), OsError> {
        self.create_or_update(name, password, password_expires, false)
            .await?;
        info!("Set password for user {}", name);
        Ok(())
    }

    async fn create_or_update(
        &self,
        name: &str,
        password: &str,
        password_expires: bool,
        create: bool,
    ) -> Result<(), OsError> {
        let mut command = CommandLine::new("NET")
            .arg("USER")
            .arg(escape::shell_input(name))
            .secret_arg(escape::shell_input(password));
        if create {
            command = command.arg("/ADD");
        }

        let output = self.process.execute(&command).await?;
        if !output.success() {
            let message = match output.stderr.trim() {
                "" => format!("NET USER exited with status {}", output.status),
                stderr => stderr.to_string(),
            };
            return Err(OsError::account_operation(name, message));
        }

        self.set_password_expiration(name, password_expires).await?;
        Ok(())
    }

    /// Set the password-expiration flag; `false` if the account is absent
    pub async fn set_password_expiration(
        &self,
        name: &str,
        expires: bool,
    ) -> Result<bool, OsError> {
        let Some(account) = self.directory.find_account(name).await? else {
            debug!("User {} not found, password expiration unchanged", name);
            return Ok(false);
        };

        self.directory
            .set_password_expires(&account.name, expires)
            .await?;
        debug!("Password expiration for {} set to {}", account.name, expires);
        Ok(true)
    }

    /// Add an account to a local group; already being a member is success
    pub async fn add_to_local_group(&self, name: &str, group: &str) -> Result<(), OsError> {
        let code = self.directory.add_local_group_member(group, name).await?;
        match code {
            0 => {
                info!("Added {} to group {}", name, group);
                Ok(())
            }
            ERROR_MEMBER_IN_ALIAS => {
                debug!("{} is already a member of {}", name, group);
                Ok(())
            }
            NERR_GROUP_NOT_FOUND => Err(OsError::GroupNotFound(group.to_string())),
            ERROR_ACCESS_DENIED => Err(OsError::Permission(format!(
                "cannot add {} to group {}",
                name, group
            ))),
            ERROR_NO_SUCH_MEMBER => Err(OsError::MemberNotFound(name.to_string())),
            ERROR_INVALID_MEMBER => Err(OsError::InvalidMember(name.to_string())),
            other => Err(OsError::unknown("NetLocalGroupAddMembers", other)),
        }
    }

    /// SID of an account, `None` if it does not exist
    pub async fn sid(&self, name: &str) -> Result<Option<Sid>, OsError> {
        Ok(self.directory.find_account(name).await?.map(|a| a.sid))
    }

    /// Profile directory of an account, `None` if it has none yet
    pub async fn home_directory(&self, name: &str) -> Result<Option<String>, OsError> {
        let Some(sid) = self.sid(name).await? else {
            debug!("User {} not found, no home directory", name);
            return Ok(None);
        };

        let path = format!("{}\\{}", PROFILE_LIST_KEY, sid);
        match self.registry.query_value(&path, PROFILE_IMAGE_PATH)? {
            Some(RegistryValue::String(home)) => Ok(Some(home)),
            Some(other) => Err(OsError::InvalidData(format!(
                "{} for {} is not a string: {}",
                PROFILE_IMAGE_PATH, name, other
            ))),
            None => {
                debug!("No profile path registered for {} ({})", name, sid);
                Ok(None)
            }
        }
    }
}
