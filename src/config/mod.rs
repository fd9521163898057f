//! OS utilities configuration
//!
//! Values that would otherwise be process-wide constants (registry root,
//! service name, poll timings) live here and are handed to each component
//! at construction.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default vendor segment of the registry root
pub const DEFAULT_VENDOR: &str = "Cloudbase Solutions";

/// Default product segment of the registry root
pub const DEFAULT_PRODUCT: &str = "Cloudbase-Init";

/// Default name of the initializing service
pub const DEFAULT_SERVICE_NAME: &str = "cloudbase-init";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsConfig {
    /// Vendor segment of `SOFTWARE\<vendor>\<product>\`
    pub vendor: String,

    /// Product segment of `SOFTWARE\<vendor>\<product>\`
    pub product: String,

    /// Service stopped by `terminate()`
    pub service_name: String,

    /// Message shown in the shutdown dialog on reboot
    pub reboot_message: String,

    /// Seconds to wait before stopping the service on terminate
    pub service_stop_grace_secs: u64,

    /// Interval between sysprep state reads, in milliseconds
    pub boot_poll_interval_ms: u64,

    /// Upper bound on the sysprep wait; `None` waits indefinitely
    pub boot_wait_timeout_secs: Option<u64>,
}

impl Default for OsConfig {
    fn default() -> Self {
        Self {
            vendor: DEFAULT_VENDOR.to_string(),
            product: DEFAULT_PRODUCT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            reboot_message: format!("{} reboot", DEFAULT_PRODUCT),
            service_stop_grace_secs: 3,
            boot_poll_interval_ms: 1000,
            boot_wait_timeout_secs: Some(3600),
        }
    }
}

impl OsConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Registry path holding persisted configuration values
    pub fn registry_root(&self) -> String {
        format!("SOFTWARE\\{}\\{}\\", self.vendor, self.product)
    }

    /// Grace period before the service stops itself
    pub fn service_stop_grace(&self) -> Duration {
        Duration::from_secs(self.service_stop_grace_secs)
    }

    /// Sysprep poll interval
    pub fn boot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.boot_poll_interval_ms)
    }

    /// Sysprep wait deadline
    pub fn boot_wait_timeout(&self) -> Option<Duration> {
        self.boot_wait_timeout_secs.map(Duration::from_secs)
    }
}
