//! Management-instrumentation backend
//!
//! Reads go through the `wmi` crate on a blocking worker, since a
//! connection is bound to the COM apartment of the thread that opened it.
//! Method calls whose parameters are arrays (and property writes) go
//! through PowerShell's CIM cmdlets, which the `wmi` crate cannot express.

use super::win32;
use crate::OsError;
use crate::escape;
use crate::platform::{
    AccountDirectory, AccountRecord, AdapterConfigRecord, AdapterFilter, AdapterRecord,
    HostApi, NetworkApi, ServiceApi, ServiceRecord, ServiceState, Sid,
};
use crate::process::{CommandLine, ProcessExecutor};
use crate::wql;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use wmi::{COMLibrary, WMIConnection, WMIError};

fn query_error(e: WMIError) -> OsError {
    OsError::Query(e.to_string())
}

/// Run `f` against a fresh connection on a blocking worker
async fn with_connection<T, F>(f: F) -> Result<T, OsError>
where
    F: FnOnce(&WMIConnection) -> Result<T, OsError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let com = COMLibrary::new().map_err(query_error)?;
        let connection = WMIConnection::new(com).map_err(query_error)?;
        f(&connection)
    })
    .await
    .map_err(|e| OsError::Query(format!("WMI worker failed: {}", e)))?
}

async fn select<T>(query: wql::Select) -> Result<Vec<T>, OsError>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    let query = query.to_string();
    debug!("WMI query: {}", query);
    with_connection(move |connection| connection.raw_query(&query).map_err(query_error)).await
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserAccount {
    name: String,
    #[serde(rename = "SID")]
    sid: String,
    password_expires: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkAdapter {
    name: String,
    index: u32,
    adapter_type_id: Option<u16>,
    physical_adapter: Option<bool>,
    #[serde(rename = "MACAddress")]
    mac_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkAdapterConfiguration {
    index: u32,
    interface_index: Option<u32>,
    #[serde(rename = "IPAddress")]
    ip_address: Option<Vec<String>>,
    #[serde(rename = "IPSubnet")]
    ip_subnet: Option<Vec<String>>,
    #[serde(rename = "DefaultIPGateway")]
    default_ip_gateway: Option<Vec<String>>,
    #[serde(rename = "DNSServerSearchOrder")]
    dns_server_search_order: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RouteEntry {
    destination: String,
}

#[derive(Deserialize)]
#[serde(rename = "Win32_Service")]
struct Service {
    #[serde(rename = "__Path")]
    path: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "State")]
    state: String,
}

#[derive(Deserialize)]
#[serde(rename = "Win32_ComputerSystem")]
struct ComputerSystem {
    #[serde(rename = "__Path")]
    path: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OperatingSystem {
    version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RenameParams {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MethodResult {
    return_value: u32,
}

fn string_array(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| escape::powershell_quoted(v)).collect();
    format!("[string[]]@({})", items.join(","))
}

/// WMI-backed directory, network, service and host facilities
pub struct WmiBackend {
    process: Arc<dyn ProcessExecutor>,
}

impl WmiBackend {
    pub fn new(process: Arc<dyn ProcessExecutor>) -> Self {
        Self { process }
    }

    /// Run a PowerShell script and return its trimmed stdout
    async fn powershell(&self, script: String) -> Result<String, OsError> {
        let command = CommandLine::new("powershell.exe").args([
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            escape::shell_input(&script),
        ]);
        let output = self.process.execute(&command).await?;
        if !output.success() {
            return Err(OsError::Command(format!(
                "PowerShell exited with status {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Invoke a method on an adapter configuration; returns `ReturnValue`
    async fn adapter_method(
        &self,
        adapter: &AdapterRecord,
        method: &str,
        arguments: &[(&str, String)],
    ) -> Result<u32, OsError> {
        let query = wql::Select::from("Win32_NetworkAdapterConfiguration")
            .where_number("Index", i64::from(adapter.index));
        let arguments: Vec<String> = arguments
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        let script = format!(
            "$config = Get-CimInstance -Query {}; \
             (Invoke-CimMethod -InputObject $config -MethodName {} -Arguments @{{{}}}).ReturnValue",
            escape::powershell_quoted(&query.to_string()),
            method,
            arguments.join("; ")
        );

        let stdout = self.powershell(script).await?;
        stdout.parse().map_err(|_| {
            OsError::InvalidData(format!("{} returned {:?}", method, stdout))
        })
    }
}

fn user_query(name: &str) -> wql::Select {
    wql::Select::from("Win32_UserAccount")
        .where_bool("LocalAccount", true)
        .where_eq("Name", name)
}

#[async_trait]
impl AccountDirectory for WmiBackend {
    async fn find_account(&self, name: &str) -> Result<Option<AccountRecord>, OsError> {
        let accounts: Vec<UserAccount> = select(user_query(name)).await?;
        Ok(accounts.into_iter().next().map(|a| AccountRecord {
            name: a.name,
            sid: Sid::new(a.sid),
            password_expires: a.password_expires,
        }))
    }

    async fn set_password_expires(&self, name: &str, expires: bool) -> Result<(), OsError> {
        let script = format!(
            "Get-CimInstance -Query {} | Set-CimInstance -Property @{{PasswordExpires=${}}}",
            escape::powershell_quoted(&user_query(name).to_string()),
            expires
        );
        self.powershell(script).await.map(|_| ())
    }

    async fn add_local_group_member(&self, group: &str, member: &str) -> Result<u32, OsError> {
        Ok(win32::add_local_group_member(group, member))
    }
}

#[async_trait]
impl NetworkApi for WmiBackend {
    async fn adapters(&self, filter: &AdapterFilter) -> Result<Vec<AdapterRecord>, OsError> {
        let adapters: Vec<NetworkAdapter> = select(filter.to_wql()).await?;
        Ok(adapters
            .into_iter()
            .map(|a| AdapterRecord {
                name: a.name,
                index: a.index,
                adapter_type_id: a.adapter_type_id,
                physical: a.physical_adapter.unwrap_or(false),
                mac_address: a.mac_address,
            })
            .collect())
    }

    async fn adapter_configurations(&self) -> Result<Vec<AdapterConfigRecord>, OsError> {
        let configs: Vec<NetworkAdapterConfiguration> =
            select(wql::Select::from("Win32_NetworkAdapterConfiguration")).await?;
        Ok(configs
            .into_iter()
            .map(|c| AdapterConfigRecord {
                index: c.index,
                interface_index: c.interface_index.unwrap_or_default(),
                ip_addresses: c.ip_address.unwrap_or_default(),
                subnet_masks: c.ip_subnet.unwrap_or_default(),
                default_gateways: c.default_ip_gateway.unwrap_or_default(),
                dns_servers: c.dns_server_search_order.unwrap_or_default(),
            })
            .collect())
    }

    async fn enable_static(
        &self,
        adapter: &AdapterRecord,
        addresses: &[String],
        masks: &[String],
    ) -> Result<u32, OsError> {
        self.adapter_method(
            adapter,
            "EnableStatic",
            &[
                ("IPAddress", string_array(addresses)),
                ("SubnetMask", string_array(masks)),
            ],
        )
        .await
    }

    async fn set_gateways(
        &self,
        adapter: &AdapterRecord,
        gateways: &[String],
        metrics: &[u16],
    ) -> Result<u32, OsError> {
        let metrics: Vec<String> = metrics.iter().map(u16::to_string).collect();
        self.adapter_method(
            adapter,
            "SetGateways",
            &[
                ("DefaultIPGateway", string_array(gateways)),
                (
                    "GatewayCostMetric",
                    format!("[uint16[]]@({})", metrics.join(",")),
                ),
            ],
        )
        .await
    }

    async fn set_dns_servers(
        &self,
        adapter: &AdapterRecord,
        servers: &[String],
    ) -> Result<u32, OsError> {
        self.adapter_method(
            adapter,
            "SetDNSServerSearchOrder",
            &[("DNSServerSearchOrder", string_array(servers))],
        )
        .await
    }

    async fn route_exists(&self, destination: &str) -> Result<bool, OsError> {
        let routes: Vec<RouteEntry> = select(
            wql::Select::from("Win32_IP4RouteTable").where_eq("Destination", destination),
        )
        .await?;
        Ok(routes.iter().any(|r| r.destination == destination))
    }
}

#[async_trait]
impl ServiceApi for WmiBackend {
    async fn find_service(&self, name: &str) -> Result<Option<ServiceRecord>, OsError> {
        let services: Vec<Service> =
            select(wql::Select::from("Win32_Service").where_eq("Name", name)).await?;
        Ok(services.into_iter().next().map(|s| ServiceRecord {
            name: s.name,
            state: ServiceState::parse(&s.state),
        }))
    }

    async fn stop_service(&self, service: &ServiceRecord) -> Result<u32, OsError> {
        let name = service.name.clone();
        let query = wql::Select::from("Win32_Service")
            .where_eq("Name", name.as_str())
            .to_string();
        with_connection(move |connection| {
            let service = connection
                .raw_query::<Service>(&query)
                .map_err(query_error)?
                .into_iter()
                .next()
                .ok_or_else(|| OsError::ServiceNotFound(name))?;
            let result: MethodResult = connection
                .exec_instance_method::<Service, (), _>("StopService", &service.path, ())
                .map_err(query_error)?;
            Ok(result.return_value)
        })
        .await
    }
}

#[async_trait]
impl HostApi for WmiBackend {
    async fn computer_name(&self) -> Result<String, OsError> {
        let systems: Vec<ComputerSystem> =
            select(wql::Select::from("Win32_ComputerSystem")).await?;
        systems
            .into_iter()
            .next()
            .map(|s| s.name)
            .ok_or_else(|| OsError::Query("Win32_ComputerSystem returned nothing".to_string()))
    }

    async fn rename_computer(&self, new_name: &str) -> Result<u32, OsError> {
        let params = RenameParams {
            name: new_name.to_string(),
        };
        with_connection(move |connection| {
            let system = connection
                .raw_query::<ComputerSystem>("SELECT * FROM Win32_ComputerSystem")
                .map_err(query_error)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    OsError::Query("Win32_ComputerSystem returned nothing".to_string())
                })?;
            let result: MethodResult = connection
                .exec_instance_method::<ComputerSystem, _, _>("Rename", &system.path, params)
                .map_err(query_error)?;
            Ok(result.return_value)
        })
        .await
    }

    async fn os_version(&self) -> Result<String, OsError> {
        let systems: Vec<OperatingSystem> =
            select(wql::Select::from("Win32_OperatingSystem")).await?;
        systems
            .into_iter()
            .next()
            .map(|s| s.version)
            .ok_or_else(|| OsError::Query("Win32_OperatingSystem returned nothing".to_string()))
    }

    async fn volume_label(&self, drive: &str) -> Result<Option<String>, OsError> {
        Ok(win32::volume_label(drive))
    }
}
