//! Machine name, OS version and volume labels

use crate::OsError;
use crate::platform::HostApi;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct HostIdentity {
    host: Arc<dyn HostApi>,
}

impl HostIdentity {
    pub fn new(host: Arc<dyn HostApi>) -> Self {
        Self { host }
    }

    /// Rename the machine; `false` if it already has this name
    ///
    /// The new name takes effect after a restart.
    pub async fn rename(&self, new_name: &str) -> Result<bool, OsError> {
        let current = self.host.computer_name().await?;
        if current == new_name {
            debug!("Computer name is already {}", new_name);
            return Ok(false);
        }

        match self.host.rename_computer(new_name).await? {
            0 => {
                info!("Renamed computer {} to {}", current, new_name);
                Ok(true)
            }
            code => Err(OsError::unknown("Rename", code)),
        }
    }

    pub async fn os_version(&self) -> Result<String, OsError> {
        self.host.os_version().await
    }

    /// Label of a volume such as `C:\`; `None` if it cannot be read
    pub async fn volume_label(&self, drive: &str) -> Result<Option<String>, OsError> {
        self.host.volume_label(drive).await
    }
}
