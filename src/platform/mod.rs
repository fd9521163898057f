//! Native facility seams
//!
//! Each trait covers one family of operating-system facilities. The
//! components in [`crate::osutils`] hold them as trait objects, so the same
//! reconciliation logic runs against the real Windows backend or against
//! [`mock::MockSystem`].

pub mod mock;

#[cfg(windows)]
pub mod windows;

use crate::OsError;
use crate::process::ProcessExecutor;
use crate::wql;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Typed registry value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistryValue {
    /// `REG_DWORD`
    Dword(u32),
    /// `REG_SZ` and `REG_EXPAND_SZ`
    String(String),
    /// `REG_QWORD`
    Qword(u64),
    /// `REG_MULTI_SZ`
    MultiString(Vec<String>),
    /// Any other type, as raw bytes
    Binary(Vec<u8>),
}

impl From<u32> for RegistryValue {
    fn from(value: u32) -> Self {
        Self::Dword(value)
    }
}

impl From<&str> for RegistryValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RegistryValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dword(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{}", s),
            Self::Qword(v) => write!(f, "{}", v),
            Self::MultiString(items) => write!(f, "{}", items.join(", ")),
            Self::Binary(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Security identifier in its string form (`S-1-5-21-...`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sid(String);

impl Sid {
    pub fn new(sid: impl Into<String>) -> Self {
        Self(sid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque native handle value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// Local account as reported by the directory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    pub sid: Sid,
    /// `None` for accounts that carry no password policy (groups, builtins)
    pub password_expires: Option<bool>,
}

/// Network adapter as reported by the management instrumentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRecord {
    pub name: String,
    /// Index shared with the adapter's configuration object
    pub index: u32,
    /// 0 is Ethernet 802.3
    pub adapter_type_id: Option<u16>,
    pub physical: bool,
    pub mac_address: Option<String>,
}

/// Which adapters a query should return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterFilter {
    /// Exact adapter name
    pub name: Option<String>,
    /// Only Ethernet, physical adapters
    pub physical_ethernet_only: bool,
}

impl AdapterFilter {
    /// Physical Ethernet adapters with a MAC address
    pub fn physical_ethernet() -> Self {
        Self {
            name: None,
            physical_ethernet_only: true,
        }
    }

    /// Adapters with a MAC address and the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            physical_ethernet_only: false,
        }
    }

    /// Render the filter as a WQL query
    pub fn to_wql(&self) -> wql::Select {
        let mut query = wql::Select::from("Win32_NetworkAdapter");
        if self.physical_ethernet_only {
            query = query
                .where_number("AdapterTypeId", 0)
                .where_bool("PhysicalAdapter", true);
        }
        query = query.where_not_null("MACAddress");
        if let Some(name) = &self.name {
            query = query.where_eq("Name", name.as_str());
        }
        query
    }

    /// Evaluate the filter against a record
    pub fn matches(&self, adapter: &AdapterRecord) -> bool {
        if adapter.mac_address.is_none() {
            return false;
        }
        if self.physical_ethernet_only && !(adapter.physical && adapter.adapter_type_id == Some(0))
        {
            return false;
        }
        match &self.name {
            Some(name) => adapter.name == *name,
            None => true,
        }
    }
}

/// IP configuration object associated with an adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfigRecord {
    /// Matches [`AdapterRecord::index`]
    pub index: u32,
    pub interface_index: u32,
    pub ip_addresses: Vec<String>,
    pub subnet_masks: Vec<String>,
    pub default_gateways: Vec<String>,
    pub dns_servers: Vec<String>,
}

/// Service run state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Running,
    Stopped,
    Other(String),
}

impl ServiceState {
    /// Parse the state string used by the service manager
    pub fn parse(state: &str) -> Self {
        match state {
            "Running" => Self::Running,
            "Stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Installed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub state: ServiceState,
}

/// Hierarchical value store under `HKEY_LOCAL_MACHINE`
pub trait Registry: Send + Sync {
    /// Read a value; `None` when the key or the value does not exist
    fn query_value(&self, path: &str, name: &str) -> Result<Option<RegistryValue>, OsError>;

    /// Write a value, creating the key path as needed
    fn set_value(&self, path: &str, name: &str, value: &RegistryValue) -> Result<(), OsError>;

    /// Delete `subkey` under `path`; `false` when it did not exist
    fn delete_key(&self, path: &str, subkey: &str) -> Result<bool, OsError>;
}

/// Token, logon and shutdown facilities
///
/// Kept synchronous: handle release runs from `Drop`.
pub trait SecurityApi: Send + Sync {
    /// Enable a named privilege on the current process token
    fn enable_privilege(&self, privilege: &str) -> Result<(), OsError>;

    /// Request an immediate, forced restart
    fn initiate_reboot(&self, message: &str) -> Result<(), OsError>;

    /// Interactive logon; returns the session token
    fn logon_user(&self, username: &str, domain: &str, password: &str)
    -> Result<RawHandle, OsError>;

    /// Load the user's profile into the session; returns the profile handle
    fn load_user_profile(&self, token: RawHandle, username: &str) -> Result<RawHandle, OsError>;

    fn unload_user_profile(&self, token: RawHandle, profile: RawHandle) -> Result<(), OsError>;

    fn close_handle(&self, handle: RawHandle) -> Result<(), OsError>;

    /// Resolve an account name to its SID and domain
    fn lookup_account(&self, username: &str) -> Result<Option<(Sid, String)>, OsError>;
}

/// Local account directory
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Exact-name account lookup
    async fn find_account(&self, name: &str) -> Result<Option<AccountRecord>, OsError>;

    /// Persist the password-expiration flag of an existing account
    async fn set_password_expires(&self, name: &str, expires: bool) -> Result<(), OsError>;

    /// Add `member` to a local group; returns the raw status code
    async fn add_local_group_member(&self, group: &str, member: &str) -> Result<u32, OsError>;
}

/// Adapter enumeration and static IP configuration
#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn adapters(&self, filter: &AdapterFilter) -> Result<Vec<AdapterRecord>, OsError>;

    async fn adapter_configurations(&self) -> Result<Vec<AdapterConfigRecord>, OsError>;

    /// Returns the raw `EnableStatic` return value
    async fn enable_static(
        &self,
        adapter: &AdapterRecord,
        addresses: &[String],
        masks: &[String],
    ) -> Result<u32, OsError>;

    /// Returns the raw `SetGateways` return value
    async fn set_gateways(
        &self,
        adapter: &AdapterRecord,
        gateways: &[String],
        metrics: &[u16],
    ) -> Result<u32, OsError>;

    /// Returns the raw `SetDNSServerSearchOrder` return value
    async fn set_dns_servers(&self, adapter: &AdapterRecord, servers: &[String])
    -> Result<u32, OsError>;

    async fn route_exists(&self, destination: &str) -> Result<bool, OsError>;
}

/// Service manager
#[async_trait]
pub trait ServiceApi: Send + Sync {
    async fn find_service(&self, name: &str) -> Result<Option<ServiceRecord>, OsError>;

    /// Returns the raw `StopService` return value
    async fn stop_service(&self, service: &ServiceRecord) -> Result<u32, OsError>;
}

/// Machine identity queries
#[async_trait]
pub trait HostApi: Send + Sync {
    async fn computer_name(&self) -> Result<String, OsError>;

    /// Returns the raw `Rename` return value
    async fn rename_computer(&self, new_name: &str) -> Result<u32, OsError>;

    async fn os_version(&self) -> Result<String, OsError>;

    /// `None` when the volume reports no label
    async fn volume_label(&self, drive: &str) -> Result<Option<String>, OsError>;
}

/// Every facility the components need, bundled for wiring
#[derive(Clone)]
pub struct Platform {
    pub registry: Arc<dyn Registry>,
    pub security: Arc<dyn SecurityApi>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub network: Arc<dyn NetworkApi>,
    pub services: Arc<dyn ServiceApi>,
    pub host: Arc<dyn HostApi>,
    pub process: Arc<dyn ProcessExecutor>,
}

impl Platform {
    /// The backend for the running operating system
    #[cfg(windows)]
    pub fn native() -> Result<Self, OsError> {
        Ok(windows::WindowsPlatform::platform())
    }

    /// The backend for the running operating system
    #[cfg(not(windows))]
    pub fn native() -> Result<Self, OsError> {
        Err(OsError::Unsupported(format!(
            "no native backend for {}",
            std::env::consts::OS
        )))
    }
}
