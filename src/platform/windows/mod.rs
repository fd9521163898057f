//! Windows backend
//!
//! Registry through winreg, queries and method calls through WMI, and the
//! remaining token, logon and netapi calls through windows-sys.

mod cim;
mod registry;
mod win32;

pub use self::registry::WindowsRegistry;
pub use self::cim::WmiBackend;

use super::{Platform, RawHandle, SecurityApi, Sid};
use crate::OsError;
use crate::process::{ProcessExecutor, SystemProcessExecutor};
use std::sync::Arc;

/// Security facilities backed by advapi32 and userenv
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsSecurity;

impl SecurityApi for WindowsSecurity {
    fn enable_privilege(&self, privilege: &str) -> Result<(), OsError> {
        win32::enable_privilege(privilege)
    }

    fn initiate_reboot(&self, message: &str) -> Result<(), OsError> {
        win32::initiate_reboot(message)
    }

    fn logon_user(
        &self,
        username: &str,
        domain: &str,
        password: &str,
    ) -> Result<RawHandle, OsError> {
        win32::logon_user(username, domain, password)
    }

    fn load_user_profile(&self, token: RawHandle, username: &str) -> Result<RawHandle, OsError> {
        win32::load_user_profile(token, username)
    }

    fn unload_user_profile(&self, token: RawHandle, profile: RawHandle) -> Result<(), OsError> {
        win32::unload_user_profile(token, profile)
    }

    fn close_handle(&self, handle: RawHandle) -> Result<(), OsError> {
        win32::close_handle(handle)
    }

    fn lookup_account(&self, username: &str) -> Result<Option<(Sid, String)>, OsError> {
        win32::lookup_account(username)
    }
}

pub struct WindowsPlatform;

impl WindowsPlatform {
    /// Wire every facility to its Windows implementation
    pub fn platform() -> Platform {
        let process: Arc<dyn ProcessExecutor> = Arc::new(SystemProcessExecutor::new());
        let wmi = Arc::new(WmiBackend::new(Arc::clone(&process)));

        Platform {
            registry: Arc::new(WindowsRegistry),
            security: Arc::new(WindowsSecurity),
            accounts: wmi.clone(),
            network: wmi.clone(),
            services: wmi.clone(),
            host: wmi,
            process,
        }
    }
}
