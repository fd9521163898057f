//! Raw Win32 calls
//!
//! Everything here that has no wrapper in winreg or wmi: token privileges,
//! logon, user profiles, restart, local group membership and volume labels.

#![allow(unsafe_code)]

use crate::OsError;
use crate::platform::{RawHandle, Sid};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use tracing::debug;
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_INSUFFICIENT_BUFFER, ERROR_NONE_MAPPED, ERROR_NOT_ALL_ASSIGNED,
    GetLastError, HANDLE, LUID, LocalFree,
};
use windows_sys::Win32::NetworkManagement::NetManagement::{
    LOCALGROUP_MEMBERS_INFO_3, NetLocalGroupAddMembers,
};
use windows_sys::Win32::Security::Authorization::ConvertSidToStringSidW;
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, LOGON32_LOGON_INTERACTIVE, LOGON32_PROVIDER_DEFAULT,
    LUID_AND_ATTRIBUTES, LogonUserW, LookupAccountNameW, LookupPrivilegeValueW, PSID,
    SE_PRIVILEGE_ENABLED, SID_NAME_USE, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows_sys::Win32::Storage::FileSystem::GetVolumeInformationW;
use windows_sys::Win32::System::Shutdown::InitiateSystemShutdownW;
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use windows_sys::Win32::UI::Shell::{LoadUserProfileW, PROFILEINFOW, UnloadUserProfile};

/// Longest volume label plus terminator
const MAX_LABEL_LEN: usize = 261;

/// NUL-terminated UTF-16
fn wide(value: &str) -> Vec<u16> {
    OsStr::new(value).encode_wide().chain(Some(0)).collect()
}

fn last_error() -> u32 {
    // SAFETY: reads thread-local state only
    unsafe { GetLastError() }
}

fn to_handle(handle: RawHandle) -> HANDLE {
    handle.0 as HANDLE
}

pub fn enable_privilege(privilege: &str) -> Result<(), OsError> {
    let mut token: HANDLE = ptr::null_mut();
    // SAFETY: GetCurrentProcess returns a pseudo-handle; token is a valid out pointer
    let opened = unsafe {
        OpenProcessToken(
            GetCurrentProcess(),
            TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
            &mut token,
        )
    };
    if opened == 0 {
        return Err(OsError::Privilege(format!(
            "OpenProcessToken failed with error {}",
            last_error()
        )));
    }

    let result = adjust_privilege(token, privilege);
    // SAFETY: token was opened above and is closed exactly once
    unsafe { CloseHandle(token) };
    result
}

fn adjust_privilege(token: HANDLE, privilege: &str) -> Result<(), OsError> {
    let name = wide(privilege);
    let mut luid = LUID {
        LowPart: 0,
        HighPart: 0,
    };
    // SAFETY: name is NUL-terminated and outlives the call
    if unsafe { LookupPrivilegeValueW(ptr::null(), name.as_ptr(), &mut luid) } == 0 {
        return Err(OsError::Privilege(format!(
            "Cannot look up {}: error {}",
            privilege,
            last_error()
        )));
    }

    let privileges = TOKEN_PRIVILEGES {
        PrivilegeCount: 1,
        Privileges: [LUID_AND_ATTRIBUTES {
            Luid: luid,
            Attributes: SE_PRIVILEGE_ENABLED,
        }],
    };
    // SAFETY: privileges is a valid TOKEN_PRIVILEGES; no previous state requested
    let adjusted = unsafe {
        AdjustTokenPrivileges(token, 0, &privileges, 0, ptr::null_mut(), ptr::null_mut())
    };
    // Succeeds with ERROR_NOT_ALL_ASSIGNED when the token lacks the privilege
    let error = last_error();
    if adjusted == 0 || error == ERROR_NOT_ALL_ASSIGNED {
        return Err(OsError::Privilege(format!(
            "Cannot enable {}: error {}",
            privilege, error
        )));
    }
    Ok(())
}

pub fn initiate_reboot(message: &str) -> Result<(), OsError> {
    let message = wide(message);
    // SAFETY: message is NUL-terminated; null machine name means the local host
    let requested = unsafe { InitiateSystemShutdownW(ptr::null(), message.as_ptr(), 0, 1, 1) };
    if requested == 0 {
        return Err(OsError::RebootFailed(format!(
            "InitiateSystemShutdownW failed with error {}",
            last_error()
        )));
    }
    Ok(())
}

pub fn logon_user(username: &str, domain: &str, password: &str) -> Result<RawHandle, OsError> {
    let user = wide(username);
    let domain = wide(domain);
    let password = wide(password);
    let mut token: HANDLE = ptr::null_mut();

    // SAFETY: all strings are NUL-terminated and outlive the call
    let ok = unsafe {
        LogonUserW(
            user.as_ptr(),
            domain.as_ptr(),
            password.as_ptr(),
            LOGON32_LOGON_INTERACTIVE,
            LOGON32_PROVIDER_DEFAULT,
            &mut token,
        )
    };
    if ok == 0 {
        return Err(OsError::LogonFailed {
            user: username.to_string(),
            code: last_error(),
        });
    }
    Ok(RawHandle(token as usize))
}

pub fn load_user_profile(token: RawHandle, username: &str) -> Result<RawHandle, OsError> {
    let mut user = wide(username);
    let mut info = PROFILEINFOW {
        dwSize: std::mem::size_of::<PROFILEINFOW>() as u32,
        dwFlags: 0,
        lpUserName: user.as_mut_ptr(),
        lpProfilePath: ptr::null_mut(),
        lpDefaultPath: ptr::null_mut(),
        lpServerName: ptr::null_mut(),
        lpPolicyPath: ptr::null_mut(),
        hProfile: ptr::null_mut(),
    };

    // SAFETY: info is fully initialized and user outlives the call
    if unsafe { LoadUserProfileW(to_handle(token), &mut info) } == 0 {
        return Err(OsError::ProfileLoad {
            user: username.to_string(),
            code: last_error(),
        });
    }
    Ok(RawHandle(info.hProfile as usize))
}

pub fn unload_user_profile(token: RawHandle, profile: RawHandle) -> Result<(), OsError> {
    // SAFETY: both handles came from logon_user / load_user_profile
    if unsafe { UnloadUserProfile(to_handle(token), to_handle(profile)) } == 0 {
        return Err(OsError::unknown("UnloadUserProfile", last_error()));
    }
    Ok(())
}

pub fn close_handle(handle: RawHandle) -> Result<(), OsError> {
    // SAFETY: the caller owns the handle and releases it once
    if unsafe { CloseHandle(to_handle(handle)) } == 0 {
        return Err(OsError::unknown("CloseHandle", last_error()));
    }
    Ok(())
}

pub fn lookup_account(username: &str) -> Result<Option<(Sid, String)>, OsError> {
    let name = wide(username);
    let mut sid_len = 0u32;
    let mut domain_len = 0u32;
    let mut sid_use: SID_NAME_USE = 0;

    // SAFETY: size query with null buffers
    unsafe {
        LookupAccountNameW(
            ptr::null(),
            name.as_ptr(),
            ptr::null_mut(),
            &mut sid_len,
            ptr::null_mut(),
            &mut domain_len,
            &mut sid_use,
        )
    };
    match last_error() {
        ERROR_INSUFFICIENT_BUFFER => {}
        ERROR_NONE_MAPPED => return Ok(None),
        code => {
            return Err(OsError::AccountLookup(format!(
                "{}: error {}",
                username, code
            )));
        }
    }

    let mut sid = vec![0u8; sid_len as usize];
    let mut domain = vec![0u16; domain_len as usize];
    // SAFETY: buffers have the sizes reported by the query above
    let ok = unsafe {
        LookupAccountNameW(
            ptr::null(),
            name.as_ptr(),
            sid.as_mut_ptr().cast(),
            &mut sid_len,
            domain.as_mut_ptr(),
            &mut domain_len,
            &mut sid_use,
        )
    };
    if ok == 0 {
        return Err(OsError::AccountLookup(format!(
            "{}: error {}",
            username,
            last_error()
        )));
    }

    let domain = String::from_utf16_lossy(&domain[..domain_len as usize]);
    let sid = sid_to_string(sid.as_mut_ptr().cast())?;
    Ok(Some((sid, domain)))
}

fn sid_to_string(sid: PSID) -> Result<Sid, OsError> {
    let mut text: *mut u16 = ptr::null_mut();
    // SAFETY: sid points to a valid SID; text receives a LocalAlloc'd string
    if unsafe { ConvertSidToStringSidW(sid, &mut text) } == 0 {
        return Err(OsError::unknown("ConvertSidToStringSidW", last_error()));
    }

    // SAFETY: text is NUL-terminated and freed exactly once below
    let value = unsafe {
        let len = (0..).take_while(|&i| *text.add(i) != 0).count();
        let value = String::from_utf16_lossy(std::slice::from_raw_parts(text, len));
        LocalFree(text.cast());
        value
    };
    Ok(Sid::new(value))
}

/// Returns the raw `NetLocalGroupAddMembers` status
pub fn add_local_group_member(group: &str, member: &str) -> u32 {
    let group = wide(group);
    let mut member = wide(member);
    let info = LOCALGROUP_MEMBERS_INFO_3 {
        lgrmi3_domainandname: member.as_mut_ptr(),
    };

    // SAFETY: one level-3 entry; group and member outlive the call
    unsafe {
        NetLocalGroupAddMembers(
            ptr::null(),
            group.as_ptr(),
            3,
            (&info as *const LOCALGROUP_MEMBERS_INFO_3).cast(),
            1,
        )
    }
}

pub fn volume_label(drive: &str) -> Option<String> {
    let root = wide(drive);
    let mut label = [0u16; MAX_LABEL_LEN];

    // SAFETY: label holds MAX_LABEL_LEN units; unused outputs are null
    let ok = unsafe {
        GetVolumeInformationW(
            root.as_ptr(),
            label.as_mut_ptr(),
            MAX_LABEL_LEN as u32,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
            0,
        )
    };
    if ok == 0 {
        debug!("Cannot read volume label of {}: error {}", drive, last_error());
        return None;
    }

    let len = label.iter().position(|&c| c == 0).unwrap_or(MAX_LABEL_LEN);
    Some(String::from_utf16_lossy(&label[..len]))
}
