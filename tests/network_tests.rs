//! Tests for adapter enumeration, static configuration and routes

use cloudbase_init_rs::osutils::{NetworkConfigurator, StaticIpConfig};
use cloudbase_init_rs::platform::mock::MockSystem;
use cloudbase_init_rs::platform::AdapterRecord;
use cloudbase_init_rs::OsError;
use std::net::{IpAddr, Ipv4Addr};

fn configurator(mock: &MockSystem) -> NetworkConfigurator {
    let platform = mock.platform();
    NetworkConfigurator::new(platform.network, platform.process)
}

fn physical(name: &str, index: u32) -> AdapterRecord {
    AdapterRecord {
        name: name.to_string(),
        index,
        adapter_type_id: Some(0),
        physical: true,
        mac_address: Some(format!("52:54:00:12:34:{:02X}", index)),
    }
}

fn config() -> StaticIpConfig {
    StaticIpConfig {
        address: Ipv4Addr::new(192, 168, 10, 20),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        broadcast: None,
        gateway: Ipv4Addr::new(192, 168, 10, 1),
        dns_servers: vec![
            IpAddr::V4(Ipv4Addr::new(192, 168, 10, 2)),
            IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
        ],
    }
}

// ==================== Adapter Enumeration ====================

/// A host with only a loopback adapter has no physical adapters
#[tokio::test]
async fn test_loopback_only_host() {
    let mock = MockSystem::new().with_adapter(AdapterRecord {
        name: "Microsoft KM-TEST Loopback Adapter".to_string(),
        index: 1,
        adapter_type_id: Some(0),
        physical: false,
        mac_address: Some("02:00:4C:4F:4F:50".to_string()),
    });

    assert!(configurator(&mock).list_adapters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_adapters_filters_virtual() {
    let mock = MockSystem::new()
        .with_adapter(physical("Ethernet", 2))
        .with_adapter(AdapterRecord {
            name: "WAN Miniport (IP)".to_string(),
            index: 3,
            adapter_type_id: None,
            physical: false,
            mac_address: None,
        })
        .with_adapter(physical("Ethernet 2", 4));

    assert_eq!(
        configurator(&mock).list_adapters().await.unwrap(),
        vec!["Ethernet", "Ethernet 2"]
    );
}

// ==================== Static Configuration ====================

#[tokio::test]
async fn test_all_steps_succeed_without_reboot() {
    let mock = MockSystem::new()
        .with_adapter(physical("Ethernet", 2))
        .with_network_return_values([0, 0, 0]);

    let reboot = configurator(&mock)
        .set_static_config("Ethernet", &config())
        .await
        .unwrap();

    assert!(!reboot);
    assert_eq!(
        mock.network_calls(),
        vec!["EnableStatic", "SetGateways", "SetDNSServerSearchOrder"]
    );
    assert_eq!(
        mock.adapter_config(2).unwrap().dns_servers,
        vec!["192.168.10.2", "1.1.1.1"]
    );
}

/// Any single step returning 1 makes the whole change need a restart
#[tokio::test]
async fn test_any_step_requiring_reboot() {
    for codes in [[1, 0, 0], [0, 1, 0], [0, 0, 1]] {
        let mock = MockSystem::new()
            .with_adapter(physical("Ethernet", 2))
            .with_network_return_values(codes);

        let reboot = configurator(&mock)
            .set_static_config("Ethernet", &config())
            .await
            .unwrap();

        assert!(reboot, "codes {:?}", codes);
        assert_eq!(mock.network_calls().len(), 3);
    }
}

/// A failing step aborts the remaining ones and keeps earlier ones
#[tokio::test]
async fn test_failure_stops_remaining_steps() {
    let mock = MockSystem::new()
        .with_adapter(physical("Ethernet", 2))
        .with_network_return_values([1, 67, 0]);

    let err = configurator(&mock)
        .set_static_config("Ethernet", &config())
        .await
        .unwrap_err();

    assert!(matches!(err, OsError::NetworkConfig(ref m) if m.contains("67")));
    assert_eq!(mock.network_calls(), vec!["EnableStatic", "SetGateways"]);

    let applied = mock.adapter_config(2).unwrap();
    assert_eq!(applied.ip_addresses, vec!["192.168.10.20"]);
    assert!(applied.default_gateways.is_empty());
    assert!(applied.dns_servers.is_empty());
}

#[tokio::test]
async fn test_first_step_failure() {
    let mock = MockSystem::new()
        .with_adapter(physical("Ethernet", 2))
        .with_network_return_values([70]);

    assert!(
        configurator(&mock)
            .set_static_config("Ethernet", &config())
            .await
            .is_err()
    );
    assert_eq!(mock.network_calls(), vec!["EnableStatic"]);
}

/// An adapter name with a quote is matched literally
#[tokio::test]
async fn test_quoted_adapter_name() {
    let mock = MockSystem::new().with_adapter(physical("Bob's NIC", 5));

    assert!(
        !configurator(&mock)
            .set_static_config("Bob's NIC", &config())
            .await
            .unwrap()
    );
    assert!(matches!(
        configurator(&mock)
            .set_static_config("Bob", &config())
            .await,
        Err(OsError::AdapterNotFound(_))
    ));
}

// ==================== Routes ====================

#[tokio::test]
async fn test_route_added_once() {
    let mock = MockSystem::new().with_route("0.0.0.0", "0.0.0.0", "10.0.0.1");
    let network = configurator(&mock);

    assert!(
        network
            .static_route_exists(Ipv4Addr::UNSPECIFIED)
            .await
            .unwrap()
    );

    let metadata = Ipv4Addr::new(169, 254, 169, 254);
    network
        .add_static_route(metadata, Ipv4Addr::BROADCAST, Ipv4Addr::new(10, 0, 0, 1), 3, 1)
        .await
        .unwrap();

    assert_eq!(mock.routes().len(), 2);
    assert_eq!(mock.routes()[1].destination, "169.254.169.254");
}
