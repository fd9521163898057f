//! Persisted configuration values
//!
//! Values live under the configured registry root, optionally one section
//! key deeper. Absent or unreadable values read as `None`.

use crate::OsError;
use crate::config::OsConfig;
use crate::platform::{Registry, RegistryValue};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key/value store scoped by an optional section
#[derive(Clone)]
pub struct ConfigStore {
    registry: Arc<dyn Registry>,
    root: String,
}

impl ConfigStore {
    pub fn new(registry: Arc<dyn Registry>, config: &OsConfig) -> Self {
        Self {
            registry,
            root: config.registry_root(),
        }
    }

    fn key_path(&self, section: Option<&str>) -> String {
        match section {
            Some(section) => format!("{}{}", self.root, section),
            None => self.root.trim_end_matches('\\').to_string(),
        }
    }

    /// Write a value; its variant selects `REG_DWORD` or `REG_SZ`
    pub fn set(
        &self,
        name: &str,
        value: impl Into<RegistryValue>,
        section: Option<&str>,
    ) -> Result<(), OsError> {
        let path = self.key_path(section);
        let value = value.into();
        debug!("Setting config value {}\\{} = {}", path, name, value);
        self.registry.set_value(&path, name, &value)
    }

    /// Read a value of any type
    ///
    /// `None` when the key or value does not exist or cannot be read.
    pub fn get(&self, name: &str, section: Option<&str>) -> Option<RegistryValue> {
        let path = self.key_path(section);
        match self.registry.query_value(&path, name) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                debug!("Config value {}\\{} not found", path, name);
                None
            }
            Err(e) => {
                warn!("Cannot read config value {}\\{}: {}", path, name, e);
                None
            }
        }
    }

    /// Remove a section and its values; an absent section is not an error
    pub fn delete(&self, section: &str) -> Result<(), OsError> {
        let root = self.key_path(None);
        if !self.registry.delete_key(&root, section)? {
            debug!("Config section {} not found, nothing to delete", section);
        }
        Ok(())
    }
}
