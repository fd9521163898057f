//! OS configuration components
//!
//! Each component wraps the platform facilities it needs. [`OsUtils`] wires
//! all of them from one [`Platform`] and [`OsConfig`].

pub mod accounts;
pub mod boot;
pub mod host;
pub mod network;
pub mod service;
pub mod session;
pub mod store;

pub use accounts::UserAccountManager;
pub use boot::BootGate;
pub use host::HostIdentity;
pub use network::{NetworkConfigurator, StaticIpConfig};
pub use service::ServiceController;
pub use session::{LogonSession, SessionManager};
pub use store::ConfigStore;

use crate::config::OsConfig;
use crate::platform::Platform;

/// All components for one host
#[derive(Clone)]
pub struct OsUtils {
    pub store: ConfigStore,
    pub sessions: SessionManager,
    pub accounts: UserAccountManager,
    pub network: NetworkConfigurator,
    pub services: ServiceController,
    pub boot: BootGate,
    pub host: HostIdentity,
}

impl OsUtils {
    pub fn new(platform: &Platform, config: &OsConfig) -> Self {
        Self {
            store: ConfigStore::new(platform.registry.clone(), config),
            sessions: SessionManager::new(platform.security.clone(), &config.reboot_message),
            accounts: UserAccountManager::new(
                platform.accounts.clone(),
                platform.process.clone(),
                platform.registry.clone(),
            ),
            network: NetworkConfigurator::new(platform.network.clone(), platform.process.clone()),
            services: ServiceController::new(
                platform.services.clone(),
                &config.service_name,
                config.service_stop_grace(),
            ),
            boot: BootGate::new(
                platform.registry.clone(),
                config.boot_poll_interval(),
                config.boot_wait_timeout(),
            ),
            host: HostIdentity::new(platform.host.clone()),
        }
    }
}
