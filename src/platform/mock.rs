//! In-memory host for testing
//!
//! `MockSystem` implements every platform trait over one shared state, and
//! emulates the `NET USER` and `ROUTE ADD` command-line tools so account and
//! route operations run end to end without a Windows machine.

use super::{
    AccountDirectory, AccountRecord, AdapterConfigRecord, AdapterFilter, AdapterRecord,
    HostApi, NetworkApi, Platform, RawHandle, Registry, RegistryValue, SecurityApi,
    ServiceApi, ServiceRecord, ServiceState, Sid,
};
use crate::OsError;
use crate::process::{CommandLine, ProcessExecutor, ProcessOutput};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const NERR_GROUP_NOT_FOUND: u32 = 2220;
const ERROR_MEMBER_IN_ALIAS: u32 = 1378;
const ERROR_NO_SUCH_MEMBER: u32 = 1387;
const ERROR_INVALID_MEMBER: u32 = 1388;
const ERROR_LOGON_FAILURE: u32 = 1326;
const ERROR_PRIVILEGE_NOT_HELD: u32 = 1314;
const SERVICE_NOT_ACTIVE: u32 = 5;

/// Mock SIDs share this machine prefix
const MACHINE_SID_PREFIX: &str = "S-1-5-21-1004336348-1177238915-682003330";

#[derive(Debug, Clone)]
struct MockAccount {
    name: String,
    sid: Sid,
    password: String,
    password_expires: bool,
}

/// A route added through the emulated `ROUTE ADD`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRoute {
    pub destination: String,
    pub mask: String,
    pub next_hop: String,
}

#[derive(Debug, Default)]
struct MockState {
    registry: BTreeMap<String, BTreeMap<String, RegistryValue>>,
    registry_sequences: HashMap<(String, String), VecDeque<Option<RegistryValue>>>,
    registry_failures: HashMap<String, String>,
    registry_reads: usize,

    accounts: BTreeMap<String, MockAccount>,
    next_rid: u32,
    groups: BTreeMap<String, BTreeSet<String>>,
    group_status: Option<u32>,

    adapters: Vec<AdapterRecord>,
    configs: BTreeMap<u32, AdapterConfigRecord>,
    network_return_values: VecDeque<u32>,
    network_calls: Vec<String>,
    routes: Vec<MockRoute>,

    services: BTreeMap<String, ServiceRecord>,
    service_stop_code: u32,

    computer_name: String,
    pending_computer_name: Option<String>,
    rename_code: u32,
    os_version: String,
    volumes: BTreeMap<String, Option<String>>,

    privileges: BTreeSet<String>,
    privilege_failure: bool,
    reboot_message: Option<String>,
    reboot_failure: bool,
    next_handle: usize,
    open_handles: BTreeSet<usize>,
    loaded_profiles: BTreeSet<usize>,
    profile_load_failure: bool,

    commands: Vec<String>,
}

/// Mock host for testing
///
/// # Example
/// ```
/// use cloudbase_init_rs::platform::mock::MockSystem;
///
/// let mock = MockSystem::new()
///     .with_account("Administrator", "Secret1!")
///     .with_group("Administrators");
/// let platform = mock.platform();
/// ```
#[derive(Debug, Clone)]
pub struct MockSystem {
    state: Arc<Mutex<MockState>>,
}

/// Registry keys and value names are case-insensitive
fn key_of(path: &str) -> String {
    path.trim_matches('\\').to_ascii_lowercase()
}

fn unescape_shell(value: &str) -> String {
    value.replace("\\\"", "\"")
}

impl MockSystem {
    /// Create an empty host named `MOCKHOST`
    pub fn new() -> Self {
        let state = MockState {
            next_rid: 1000,
            next_handle: 0x100,
            computer_name: "MOCKHOST".to_string(),
            os_version: "10.0.20348".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a [`Platform`] whose facilities all share this host's state
    pub fn platform(&self) -> Platform {
        Platform {
            registry: Arc::new(self.clone()),
            security: Arc::new(self.clone()),
            accounts: Arc::new(self.clone()),
            network: Arc::new(self.clone()),
            services: Arc::new(self.clone()),
            host: Arc::new(self.clone()),
            process: Arc::new(self.clone()),
        }
    }

    // ==================== Builders ====================

    /// Add a local user account
    pub fn with_account(self, name: &str, password: &str) -> Self {
        self.state().insert_account(name, password);
        self
    }

    /// Add an empty local group
    pub fn with_group(self, name: &str) -> Self {
        self.state()
            .groups
            .entry(name.to_ascii_lowercase())
            .or_default();
        self
    }

    /// Force every group-membership call to return `code`
    pub fn with_group_status(self, code: u32) -> Self {
        self.state().group_status = Some(code);
        self
    }

    /// Add a network adapter and an empty configuration object for it
    pub fn with_adapter(self, adapter: AdapterRecord) -> Self {
        {
            let mut state = self.state();
            state.configs.entry(adapter.index).or_insert(AdapterConfigRecord {
                index: adapter.index,
                interface_index: adapter.index,
                ..Default::default()
            });
            state.adapters.push(adapter);
        }
        self
    }

    /// Replace an adapter's configuration object
    pub fn with_adapter_config(self, config: AdapterConfigRecord) -> Self {
        self.state().configs.insert(config.index, config);
        self
    }

    /// Return values for successive static-configuration calls (default 0)
    pub fn with_network_return_values(self, codes: impl IntoIterator<Item = u32>) -> Self {
        self.state().network_return_values = codes.into_iter().collect();
        self
    }

    /// Add a pre-existing route
    pub fn with_route(self, destination: &str, mask: &str, next_hop: &str) -> Self {
        self.state().routes.push(MockRoute {
            destination: destination.to_string(),
            mask: mask.to_string(),
            next_hop: next_hop.to_string(),
        });
        self
    }

    /// Add an installed service
    pub fn with_service(self, name: &str, state: ServiceState) -> Self {
        self.state().services.insert(
            name.to_string(),
            ServiceRecord {
                name: name.to_string(),
                state,
            },
        );
        self
    }

    /// Return value of `StopService`
    pub fn with_service_stop_code(self, code: u32) -> Self {
        self.state().service_stop_code = code;
        self
    }

    pub fn with_computer_name(self, name: &str) -> Self {
        self.state().computer_name = name.to_string();
        self
    }

    /// Return value of the computer rename call
    pub fn with_rename_code(self, code: u32) -> Self {
        self.state().rename_code = code;
        self
    }

    pub fn with_os_version(self, version: &str) -> Self {
        self.state().os_version = version.to_string();
        self
    }

    /// Add a volume; `label` of `None` means the label cannot be read
    pub fn with_volume(self, drive: &str, label: Option<&str>) -> Self {
        self.state()
            .volumes
            .insert(drive.to_ascii_uppercase(), label.map(str::to_string));
        self
    }

    pub fn with_registry_value(self, path: &str, name: &str, value: RegistryValue) -> Self {
        self.state()
            .registry
            .entry(key_of(path))
            .or_default()
            .insert(name.to_ascii_lowercase(), value);
        self
    }

    /// Successive reads of `path\name` return these values in order
    ///
    /// The last entry repeats once the sequence is exhausted; `None` reads as
    /// an absent value.
    pub fn with_registry_sequence(
        self,
        path: &str,
        name: &str,
        values: impl IntoIterator<Item = Option<RegistryValue>>,
    ) -> Self {
        self.state().registry_sequences.insert(
            (key_of(path), name.to_ascii_lowercase()),
            values.into_iter().collect(),
        );
        self
    }

    /// Every access to `path` fails with `message`
    pub fn with_registry_failure(self, path: &str, message: &str) -> Self {
        self.state()
            .registry_failures
            .insert(key_of(path), message.to_string());
        self
    }

    pub fn with_profile_load_failure(self) -> Self {
        self.state().profile_load_failure = true;
        self
    }

    pub fn with_privilege_failure(self) -> Self {
        self.state().privilege_failure = true;
        self
    }

    pub fn with_reboot_failure(self) -> Self {
        self.state().reboot_failure = true;
        self
    }

    // ==================== Inspection ====================

    /// Password currently set on an account
    pub fn password_of(&self, name: &str) -> Option<String> {
        self.state()
            .accounts
            .get(&name.to_ascii_lowercase())
            .map(|a| a.password.clone())
    }

    /// Password-expiration flag of an account
    pub fn password_expires(&self, name: &str) -> Option<bool> {
        self.state()
            .accounts
            .get(&name.to_ascii_lowercase())
            .map(|a| a.password_expires)
    }

    /// Members of a group, lowercased
    pub fn group_members(&self, group: &str) -> Vec<String> {
        self.state()
            .groups
            .get(&group.to_ascii_lowercase())
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Static-configuration calls in the order they were made
    pub fn network_calls(&self) -> Vec<String> {
        self.state().network_calls.clone()
    }

    pub fn adapter_config(&self, index: u32) -> Option<AdapterConfigRecord> {
        self.state().configs.get(&index).cloned()
    }

    pub fn routes(&self) -> Vec<MockRoute> {
        self.state().routes.clone()
    }

    pub fn service_state(&self, name: &str) -> Option<ServiceState> {
        self.state().services.get(name).map(|s| s.state.clone())
    }

    /// Name that takes effect after the next restart
    pub fn pending_computer_name(&self) -> Option<String> {
        self.state().pending_computer_name.clone()
    }

    pub fn privileges_enabled(&self) -> Vec<String> {
        self.state().privileges.iter().cloned().collect()
    }

    /// Message of the requested restart, if any
    pub fn reboot_message(&self) -> Option<String> {
        self.state().reboot_message.clone()
    }

    pub fn open_handle_count(&self) -> usize {
        self.state().open_handles.len()
    }

    pub fn loaded_profile_count(&self) -> usize {
        self.state().loaded_profiles.len()
    }

    /// Number of registry value reads so far
    pub fn registry_reads(&self) -> usize {
        self.state().registry_reads
    }

    pub fn registry_value(&self, path: &str, name: &str) -> Option<RegistryValue> {
        self.state()
            .registry
            .get(&key_of(path))
            .and_then(|values| values.get(&name.to_ascii_lowercase()).cloned())
    }

    /// Executed command lines, secrets masked
    pub fn executed_commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn insert_account(&mut self, name: &str, password: &str) -> Sid {
        let rid = self.next_rid;
        self.next_rid += 1;
        let sid = Sid::new(format!("{}-{}", MACHINE_SID_PREFIX, rid));
        self.accounts.insert(
            name.to_ascii_lowercase(),
            MockAccount {
                name: name.to_string(),
                sid: sid.clone(),
                password: password.to_string(),
                password_expires: true,
            },
        );
        sid
    }

    fn new_handle(&mut self) -> usize {
        self.next_handle += 4;
        self.next_handle
    }

    fn next_network_code(&mut self) -> u32 {
        self.network_return_values.pop_front().unwrap_or(0)
    }

    fn net_user(&mut self, args: &[String]) -> ProcessOutput {
        let (Some(name), Some(password)) = (args.get(1), args.get(2)) else {
            return ProcessOutput {
                stderr: "The syntax of this command is:\r\n\r\nNET USER\r\n".to_string(),
                status: 1,
                ..Default::default()
            };
        };
        let name = unescape_shell(name);
        let password = unescape_shell(password);
        let create = args
            .get(3)
            .is_some_and(|flag| flag.eq_ignore_ascii_case("/ADD"));
        let key = name.to_ascii_lowercase();

        if create {
            if self.accounts.contains_key(&key) || self.groups.contains_key(&key) {
                return ProcessOutput {
                    stderr: "The account already exists.\r\n\r\n\
                             More help is available by typing NET HELPMSG 2224.\r\n"
                        .to_string(),
                    status: 2,
                    ..Default::default()
                };
            }
            self.insert_account(&name, &password);
        } else {
            match self.accounts.get_mut(&key) {
                Some(account) => account.password = password,
                None => {
                    return ProcessOutput {
                        stderr: "The user name could not be found.\r\n\r\n\
                                 More help is available by typing NET HELPMSG 2221.\r\n"
                            .to_string(),
                        status: 2,
                        ..Default::default()
                    };
                }
            }
        }

        ProcessOutput {
            stdout: "The command completed successfully.\r\n".to_string(),
            ..Default::default()
        }
    }

    fn route_add(&mut self, args: &[String]) -> ProcessOutput {
        // ADD <destination> MASK <mask> <gateway>
        let parsed = match args {
            [_, destination, mask_kw, mask, next_hop, ..] if mask_kw.eq_ignore_ascii_case("MASK") => {
                let valid = [destination, mask, next_hop]
                    .iter()
                    .all(|v| v.parse::<Ipv4Addr>().is_ok());
                valid.then(|| MockRoute {
                    destination: destination.clone(),
                    mask: mask.clone(),
                    next_hop: next_hop.clone(),
                })
            }
            _ => None,
        };

        match parsed {
            Some(route) => {
                self.routes.push(route);
                ProcessOutput {
                    stdout: " OK!\r\n".to_string(),
                    ..Default::default()
                }
            }
            // ROUTE reports bad arguments on stderr but still exits 0
            None => ProcessOutput {
                stderr: "The route addition failed: The parameter is incorrect.\r\n".to_string(),
                ..Default::default()
            },
        }
    }
}

impl Registry for MockSystem {
    fn query_value(&self, path: &str, name: &str) -> Result<Option<RegistryValue>, OsError> {
        let mut state = self.state();
        let key = key_of(path);
        state.registry_reads += 1;

        if let Some(message) = state.registry_failures.get(&key) {
            return Err(OsError::registry(path, message.clone()));
        }

        if let Some(sequence) = state
            .registry_sequences
            .get_mut(&(key.clone(), name.to_ascii_lowercase()))
        {
            let value = if sequence.len() > 1 {
                sequence.pop_front().flatten()
            } else {
                sequence.front().cloned().flatten()
            };
            return Ok(value);
        }

        Ok(state
            .registry
            .get(&key)
            .and_then(|values| values.get(&name.to_ascii_lowercase()).cloned()))
    }

    fn set_value(&self, path: &str, name: &str, value: &RegistryValue) -> Result<(), OsError> {
        let mut state = self.state();
        let key = key_of(path);

        if let Some(message) = state.registry_failures.get(&key) {
            return Err(OsError::registry(path, message.clone()));
        }

        state
            .registry
            .entry(key)
            .or_default()
            .insert(name.to_ascii_lowercase(), value.clone());
        Ok(())
    }

    fn delete_key(&self, path: &str, subkey: &str) -> Result<bool, OsError> {
        let mut state = self.state();
        let key = key_of(&format!("{}\\{}", path.trim_end_matches('\\'), subkey));

        if let Some(message) = state.registry_failures.get(&key_of(path)) {
            return Err(OsError::registry(path, message.clone()));
        }

        let prefix = format!("{}\\", key);
        if state.registry.keys().any(|k| k.starts_with(&prefix)) {
            return Err(OsError::registry(path, "key has subkeys"));
        }

        Ok(state.registry.remove(&key).is_some())
    }
}

impl SecurityApi for MockSystem {
    fn enable_privilege(&self, privilege: &str) -> Result<(), OsError> {
        let mut state = self.state();
        if state.privilege_failure {
            return Err(OsError::Privilege(format!(
                "cannot enable {} (error {})",
                privilege, ERROR_PRIVILEGE_NOT_HELD
            )));
        }
        state.privileges.insert(privilege.to_string());
        Ok(())
    }

    fn initiate_reboot(&self, message: &str) -> Result<(), OsError> {
        let mut state = self.state();
        if state.reboot_failure || !state.privileges.contains("SeShutdownPrivilege") {
            return Err(OsError::RebootFailed(format!(
                "InitiateSystemShutdown returned error {}",
                ERROR_PRIVILEGE_NOT_HELD
            )));
        }
        state.reboot_message = Some(message.to_string());
        Ok(())
    }

    fn logon_user(
        &self,
        username: &str,
        _domain: &str,
        password: &str,
    ) -> Result<RawHandle, OsError> {
        let mut state = self.state();
        let valid = state
            .accounts
            .get(&username.to_ascii_lowercase())
            .is_some_and(|a| a.password == password);
        if !valid {
            return Err(OsError::LogonFailed {
                user: username.to_string(),
                code: ERROR_LOGON_FAILURE,
            });
        }
        let handle = state.new_handle();
        state.open_handles.insert(handle);
        Ok(RawHandle(handle))
    }

    fn load_user_profile(&self, token: RawHandle, username: &str) -> Result<RawHandle, OsError> {
        let mut state = self.state();
        if state.profile_load_failure || !state.open_handles.contains(&token.0) {
            return Err(OsError::ProfileLoad {
                user: username.to_string(),
                code: ERROR_PRIVILEGE_NOT_HELD,
            });
        }
        let profile = state.new_handle();
        state.loaded_profiles.insert(profile);
        Ok(RawHandle(profile))
    }

    fn unload_user_profile(&self, _token: RawHandle, profile: RawHandle) -> Result<(), OsError> {
        if self.state().loaded_profiles.remove(&profile.0) {
            Ok(())
        } else {
            Err(OsError::InvalidData(format!(
                "profile handle {:#x} not loaded",
                profile.0
            )))
        }
    }

    fn close_handle(&self, handle: RawHandle) -> Result<(), OsError> {
        if self.state().open_handles.remove(&handle.0) {
            Ok(())
        } else {
            Err(OsError::InvalidData(format!("handle {:#x} not open", handle.0)))
        }
    }

    fn lookup_account(&self, username: &str) -> Result<Option<(Sid, String)>, OsError> {
        let state = self.state();
        Ok(state
            .accounts
            .get(&username.to_ascii_lowercase())
            .map(|a| (a.sid.clone(), state.computer_name.clone())))
    }
}

#[async_trait]
impl AccountDirectory for MockSystem {
    async fn find_account(&self, name: &str) -> Result<Option<AccountRecord>, OsError> {
        Ok(self
            .state()
            .accounts
            .get(&name.to_ascii_lowercase())
            .map(|a| AccountRecord {
                name: a.name.clone(),
                sid: a.sid.clone(),
                password_expires: Some(a.password_expires),
            }))
    }

    async fn set_password_expires(&self, name: &str, expires: bool) -> Result<(), OsError> {
        match self.state().accounts.get_mut(&name.to_ascii_lowercase()) {
            Some(account) => {
                account.password_expires = expires;
                Ok(())
            }
            None => Err(OsError::AccountLookup(name.to_string())),
        }
    }

    async fn add_local_group_member(&self, group: &str, member: &str) -> Result<u32, OsError> {
        let mut state = self.state();
        if let Some(code) = state.group_status {
            return Ok(code);
        }

        let member_key = member.to_ascii_lowercase();
        if !state.groups.contains_key(&group.to_ascii_lowercase()) {
            return Ok(NERR_GROUP_NOT_FOUND);
        }
        if state.groups.contains_key(&member_key) {
            return Ok(ERROR_INVALID_MEMBER);
        }
        if !state.accounts.contains_key(&member_key) {
            return Ok(ERROR_NO_SUCH_MEMBER);
        }

        let members = state.groups.entry(group.to_ascii_lowercase()).or_default();
        if !members.insert(member_key) {
            return Ok(ERROR_MEMBER_IN_ALIAS);
        }
        Ok(0)
    }
}

#[async_trait]
impl NetworkApi for MockSystem {
    async fn adapters(&self, filter: &AdapterFilter) -> Result<Vec<AdapterRecord>, OsError> {
        Ok(self
            .state()
            .adapters
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn adapter_configurations(&self) -> Result<Vec<AdapterConfigRecord>, OsError> {
        Ok(self.state().configs.values().cloned().collect())
    }

    async fn enable_static(
        &self,
        adapter: &AdapterRecord,
        addresses: &[String],
        masks: &[String],
    ) -> Result<u32, OsError> {
        let mut state = self.state();
        state.network_calls.push("EnableStatic".to_string());
        let code = state.next_network_code();
        if code <= 1
            && let Some(config) = state.configs.get_mut(&adapter.index)
        {
            config.ip_addresses = addresses.to_vec();
            config.subnet_masks = masks.to_vec();
        }
        Ok(code)
    }

    async fn set_gateways(
        &self,
        adapter: &AdapterRecord,
        gateways: &[String],
        _metrics: &[u16],
    ) -> Result<u32, OsError> {
        let mut state = self.state();
        state.network_calls.push("SetGateways".to_string());
        let code = state.next_network_code();
        if code <= 1
            && let Some(config) = state.configs.get_mut(&adapter.index)
        {
            config.default_gateways = gateways.to_vec();
        }
        Ok(code)
    }

    async fn set_dns_servers(
        &self,
        adapter: &AdapterRecord,
        servers: &[String],
    ) -> Result<u32, OsError> {
        let mut state = self.state();
        state.network_calls.push("SetDNSServerSearchOrder".to_string());
        let code = state.next_network_code();
        if code <= 1
            && let Some(config) = state.configs.get_mut(&adapter.index)
        {
            config.dns_servers = servers.to_vec();
        }
        Ok(code)
    }

    async fn route_exists(&self, destination: &str) -> Result<bool, OsError> {
        Ok(self
            .state()
            .routes
            .iter()
            .any(|r| r.destination == destination))
    }
}

#[async_trait]
impl ServiceApi for MockSystem {
    async fn find_service(&self, name: &str) -> Result<Option<ServiceRecord>, OsError> {
        Ok(self.state().services.get(name).cloned())
    }

    async fn stop_service(&self, service: &ServiceRecord) -> Result<u32, OsError> {
        let mut state = self.state();
        let scripted = state.service_stop_code;
        let Some(record) = state.services.get_mut(&service.name) else {
            return Ok(scripted);
        };
        // a service that is not running cannot accept the control
        let stopped = record.state == ServiceState::Stopped;
        let code = match (scripted, stopped) {
            (0, true) => SERVICE_NOT_ACTIVE,
            (0, false) => {
                record.state = ServiceState::Stopped;
                0
            }
            (code, _) => code,
        };
        Ok(code)
    }
}

#[async_trait]
impl HostApi for MockSystem {
    async fn computer_name(&self) -> Result<String, OsError> {
        Ok(self.state().computer_name.clone())
    }

    async fn rename_computer(&self, new_name: &str) -> Result<u32, OsError> {
        let mut state = self.state();
        let code = state.rename_code;
        if code == 0 {
            state.pending_computer_name = Some(new_name.to_string());
        }
        Ok(code)
    }

    async fn os_version(&self) -> Result<String, OsError> {
        Ok(self.state().os_version.clone())
    }

    async fn volume_label(&self, drive: &str) -> Result<Option<String>, OsError> {
        Ok(self
            .state()
            .volumes
            .get(&drive.to_ascii_uppercase())
            .cloned()
            .flatten())
    }
}

#[async_trait]
impl ProcessExecutor for MockSystem {
    async fn execute(&self, command: &CommandLine) -> Result<ProcessOutput, OsError> {
        let mut state = self.state();
        state.commands.push(command.to_string());

        let args = command.arguments();
        let program = command.program().to_ascii_uppercase();
        let verb = args.first().map(|a| a.to_ascii_uppercase());

        let output = match (program.as_str(), verb.as_deref()) {
            ("NET", Some("USER")) => state.net_user(args),
            ("ROUTE", Some("ADD")) => state.route_add(args),
            _ => ProcessOutput {
                stderr: format!(
                    "'{}' is not recognized as an internal or external command\r\n",
                    command.program()
                ),
                status: 9009,
                ..Default::default()
            },
        };
        Ok(output)
    }
}
