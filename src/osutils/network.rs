//! Network adapters, static IP configuration and routes

use crate::OsError;
use crate::outcome::NativeOutcome;
use crate::platform::{AdapterFilter, AdapterRecord, NetworkApi};
use crate::process::{CommandLine, ProcessExecutor};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, info};

/// Static IPv4 configuration for one adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIpConfig {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// Derived by the stack from address and netmask; logged only
    #[serde(default)]
    pub broadcast: Option<Ipv4Addr>,
    pub gateway: Ipv4Addr,
    #[serde(default)]
    pub dns_servers: Vec<IpAddr>,
}

/// Adapter enumeration, static configuration and routes
#[derive(Clone)]
pub struct NetworkConfigurator {
    network: Arc<dyn NetworkApi>,
    process: Arc<dyn ProcessExecutor>,
}

impl NetworkConfigurator {
    pub fn new(network: Arc<dyn NetworkApi>, process: Arc<dyn ProcessExecutor>) -> Self {
        Self { network, process }
    }

    /// Names of the physical Ethernet adapters
    pub async fn list_adapters(&self) -> Result<Vec<String>, OsError> {
        let adapters = self
            .network
            .adapters(&AdapterFilter::physical_ethernet())
            .await?;
        debug!("Found {} physical adapters", adapters.len());
        Ok(adapters.into_iter().map(|a| a.name).collect())
    }

    /// Apply address, gateway and DNS servers to the named adapter
    ///
    /// Returns whether a restart is needed for the change to take effect.
    /// The first failing step aborts the rest; earlier steps stay applied.
    pub async fn set_static_config(
        &self,
        adapter_name: &str,
        config: &StaticIpConfig,
    ) -> Result<bool, OsError> {
        let adapter = self
            .network
            .adapters(&AdapterFilter::named(adapter_name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OsError::AdapterNotFound(adapter_name.to_string()))?;

        if let Some(broadcast) = config.broadcast {
            debug!("Ignoring broadcast address {} for {}", broadcast, adapter.name);
        }

        info!(
            "Setting static IP {}/{} on {}",
            config.address, config.netmask, adapter.name
        );
        let code = self
            .network
            .enable_static(
                &adapter,
                &[config.address.to_string()],
                &[config.netmask.to_string()],
            )
            .await?;
        let mut reboot_required = check_step("set static IP address", &adapter, code)?;

        info!("Setting gateway {} on {}", config.gateway, adapter.name);
        let code = self
            .network
            .set_gateways(&adapter, &[config.gateway.to_string()], &[1])
            .await?;
        reboot_required |= check_step("set gateway", &adapter, code)?;

        let dns: Vec<String> = config.dns_servers.iter().map(IpAddr::to_string).collect();
        info!("Setting DNS servers {:?} on {}", dns, adapter.name);
        let code = self.network.set_dns_servers(&adapter, &dns).await?;
        reboot_required |= check_step("set DNS servers", &adapter, code)?;

        Ok(reboot_required)
    }

    /// Interface index and address of the first configured default gateway
    pub async fn default_gateway(&self) -> Result<Option<(u32, String)>, OsError> {
        let configs = self.network.adapter_configurations().await?;
        Ok(configs.into_iter().find_map(|config| {
            config
                .default_gateways
                .into_iter()
                .next()
                .map(|gateway| (config.interface_index, gateway))
        }))
    }

    pub async fn static_route_exists(&self, destination: Ipv4Addr) -> Result<bool, OsError> {
        self.network.route_exists(&destination.to_string()).await
    }

    /// Add a route with `ROUTE ADD`
    ///
    /// The tool's exit code is unreliable; only output on stderr counts as
    /// failure. `interface_index` and `metric` are not passed to the tool.
    pub async fn add_static_route(
        &self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        next_hop: Ipv4Addr,
        interface_index: u32,
        metric: u32,
    ) -> Result<(), OsError> {
        debug!(
            "Adding route to {}/{} via {} (interface {}, metric {})",
            destination, mask, next_hop, interface_index, metric
        );

        let command = CommandLine::new("ROUTE").args([
            "ADD".to_string(),
            destination.to_string(),
            "MASK".to_string(),
            mask.to_string(),
            next_hop.to_string(),
        ]);
        let output = self.process.execute(&command).await?;

        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            return Err(OsError::NetworkConfig(format!(
                "Unable to add route: {}",
                stderr
            )));
        }

        info!("Added route to {} via {}", destination, next_hop);
        Ok(())
    }
}

/// Fold one step's return value into the restart flag, or fail
fn check_step(step: &str, adapter: &AdapterRecord, code: u32) -> Result<bool, OsError> {
    match NativeOutcome::from_return_value(code) {
        NativeOutcome::Ok => Ok(false),
        NativeOutcome::OkRebootRequired => {
            debug!("{} on {} requires a restart", step, adapter.name);
            Ok(true)
        }
        NativeOutcome::Failed(code) => Err(OsError::NetworkConfig(format!(
            "Cannot {} on adapter {}: return value {}",
            step, adapter.name, code
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockSystem;
    use crate::platform::AdapterConfigRecord;

    fn nic(name: &str, index: u32) -> AdapterRecord {
        AdapterRecord {
            name: name.to_string(),
            index,
            adapter_type_id: Some(0),
            physical: true,
            mac_address: Some(format!("00:15:5D:00:00:{:02X}", index)),
        }
    }

    fn configurator(mock: &MockSystem) -> NetworkConfigurator {
        let platform = mock.platform();
        NetworkConfigurator::new(platform.network, platform.process)
    }

    fn static_config() -> StaticIpConfig {
        StaticIpConfig {
            address: Ipv4Addr::new(10, 0, 0, 5),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            broadcast: Some(Ipv4Addr::new(10, 0, 0, 255)),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            dns_servers: vec![IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))],
        }
    }

    #[tokio::test]
    async fn test_set_static_config_applies_all_steps() {
        let mock = MockSystem::new().with_adapter(nic("Ethernet", 7));

        let reboot = configurator(&mock)
            .set_static_config("Ethernet", &static_config())
            .await
            .unwrap();

        assert!(!reboot);
        let config = mock.adapter_config(7).unwrap();
        assert_eq!(config.ip_addresses, vec!["10.0.0.5"]);
        assert_eq!(config.subnet_masks, vec!["255.255.255.0"]);
        assert_eq!(config.default_gateways, vec!["10.0.0.1"]);
        assert_eq!(config.dns_servers, vec!["8.8.8.8"]);
    }

    #[tokio::test]
    async fn test_unknown_adapter() {
        let mock = MockSystem::new().with_adapter(nic("Ethernet", 7));

        let err = configurator(&mock)
            .set_static_config("Ethernet 9", &static_config())
            .await
            .unwrap_err();
        assert!(matches!(err, OsError::AdapterNotFound(name) if name == "Ethernet 9"));
        assert!(mock.network_calls().is_empty());
    }

    #[tokio::test]
    async fn test_default_gateway_first_configured() {
        let mock = MockSystem::new()
            .with_adapter_config(AdapterConfigRecord {
                index: 1,
                interface_index: 11,
                ..Default::default()
            })
            .with_adapter_config(AdapterConfigRecord {
                index: 2,
                interface_index: 12,
                default_gateways: vec!["192.168.1.1".to_string(), "192.168.1.2".to_string()],
                ..Default::default()
            });

        assert_eq!(
            configurator(&mock).default_gateway().await.unwrap(),
            Some((12, "192.168.1.1".to_string()))
        );
        assert_eq!(
            configurator(&MockSystem::new()).default_gateway().await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_add_static_route() {
        let mock = MockSystem::new();
        let network = configurator(&mock);
        let destination = Ipv4Addr::new(169, 254, 169, 254);

        assert!(!network.static_route_exists(destination).await.unwrap());
        network
            .add_static_route(
                destination,
                Ipv4Addr::new(255, 255, 255, 255),
                Ipv4Addr::new(10, 0, 0, 1),
                12,
                10,
            )
            .await
            .unwrap();

        assert!(network.static_route_exists(destination).await.unwrap());
        assert_eq!(
            mock.executed_commands(),
            vec!["ROUTE ADD 169.254.169.254 MASK 255.255.255.255 10.0.0.1"]
        );
    }
}
