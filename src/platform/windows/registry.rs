//! `HKEY_LOCAL_MACHINE` access through winreg

use crate::OsError;
use crate::platform::{Registry, RegistryValue};
use std::io;
use winreg::enums::{
    HKEY_LOCAL_MACHINE, KEY_ALL_ACCESS, KEY_READ, REG_BINARY, REG_DWORD, REG_EXPAND_SZ,
    REG_MULTI_SZ, REG_QWORD, REG_SZ,
};
use winreg::types::FromRegValue;
use winreg::{RegKey, RegValue};

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsRegistry;

fn registry_error(path: &str, e: io::Error) -> OsError {
    OsError::registry(path, e.to_string())
}

/// Open `path` for `access`; `None` when it does not exist
fn open(path: &str, access: u32) -> Result<Option<RegKey>, OsError> {
    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    match hklm.open_subkey_with_flags(path, access) {
        Ok(key) => Ok(Some(key)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(registry_error(path, e)),
    }
}

impl Registry for WindowsRegistry {
    fn query_value(&self, path: &str, name: &str) -> Result<Option<RegistryValue>, OsError> {
        let Some(key) = open(path, KEY_READ)? else {
            return Ok(None);
        };

        let raw = match key.get_raw_value(name) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(registry_error(path, e)),
        };

        let value = match raw.vtype {
            REG_DWORD => u32::from_reg_value(&raw).map(RegistryValue::Dword),
            REG_QWORD => u64::from_reg_value(&raw).map(RegistryValue::Qword),
            REG_SZ | REG_EXPAND_SZ => String::from_reg_value(&raw).map(RegistryValue::String),
            REG_MULTI_SZ => Vec::<String>::from_reg_value(&raw).map(RegistryValue::MultiString),
            _ => Ok(RegistryValue::Binary(raw.bytes)),
        };
        value.map(Some).map_err(|e| registry_error(path, e))
    }

    fn set_value(&self, path: &str, name: &str, value: &RegistryValue) -> Result<(), OsError> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let (key, _) = hklm
            .create_subkey(path)
            .map_err(|e| registry_error(path, e))?;

        let written = match value {
            RegistryValue::Dword(v) => key.set_value(name, v),
            RegistryValue::String(s) => key.set_value(name, s),
            RegistryValue::Qword(v) => key.set_value(name, v),
            RegistryValue::MultiString(items) => key.set_value(name, items),
            RegistryValue::Binary(bytes) => key.set_raw_value(
                name,
                &RegValue {
                    bytes: bytes.clone(),
                    vtype: REG_BINARY,
                },
            ),
        };
        written.map_err(|e| registry_error(path, e))
    }

    fn delete_key(&self, path: &str, subkey: &str) -> Result<bool, OsError> {
        let Some(parent) = open(path, KEY_ALL_ACCESS)? else {
            return Ok(false);
        };

        match parent.delete_subkey(subkey) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(registry_error(path, e)),
        }
    }
}
