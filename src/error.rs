//! Error types for cloudbase-init-rs

use thiserror::Error;

/// Main error type for OS configuration operations
///
/// Every native failure maps to exactly one variant so callers can classify
/// it without parsing messages. Benign outcomes (already a member, absent
/// config value, unreadable config value, absent sysprep record, matching hostname) are never errors.
#[derive(Error, Debug)]
pub enum OsError {
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Account operation failed for '{account}': {message}")]
    AccountOperation { account: String, message: String },

    #[error("Cannot resolve account: {0}")]
    AccountLookup(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Invalid member: {0}")]
    InvalidMember(String),

    #[error("Logon failed for user '{user}' (error {code})")]
    LogonFailed { user: String, code: u32 },

    #[error("Cannot load profile for user '{user}' (error {code})")]
    ProfileLoad { user: String, code: u32 },

    #[error("Network adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("Network configuration error: {0}")]
    NetworkConfig(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Stopping service {service} failed with return value: {code}")]
    ServiceStop { service: String, code: u32 },

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Reboot failed: {0}")]
    RebootFailed(String),

    #[error("{operation} failed with unexpected code {code}")]
    UnknownOperation { operation: String, code: u32 },

    #[error("Registry error at '{path}': {message}")]
    Registry { path: String, message: String },

    #[error("Management query failed: {0}")]
    Query(String),

    #[error("Command execution failed: {0}")]
    Command(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl OsError {
    /// Create an account operation error
    pub fn account_operation(account: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AccountOperation {
            account: account.into(),
            message: message.into(),
        }
    }

    /// Create an error for a native result code nobody enumerated
    pub fn unknown(operation: impl Into<String>, code: u32) -> Self {
        Self::UnknownOperation {
            operation: operation.into(),
            code,
        }
    }

    /// Create a registry error
    pub fn registry(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registry {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_operation_carries_code() {
        let err = OsError::unknown("NetLocalGroupAddMembers", 87);
        assert!(matches!(err, OsError::UnknownOperation { code: 87, .. }));
        assert_eq!(
            err.to_string(),
            "NetLocalGroupAddMembers failed with unexpected code 87"
        );
    }

    #[test]
    fn test_service_stop_message_embeds_code() {
        let err = OsError::ServiceStop {
            service: "cloudbase-init".to_string(),
            code: 5,
        };
        assert!(err.to_string().contains("return value: 5"));
    }
}
