//! Result-code classification
//!
//! Several native configuration calls encode "succeeded, but a restart is
//! needed" in their return value. [`NativeOutcome`] makes that explicit.

use serde::{Deserialize, Serialize};

/// Outcome of a native call returning `0`, `1`, or a failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOutcome {
    /// Return value 0
    Ok,
    /// Return value 1: applied, takes effect after a restart
    OkRebootRequired,
    /// Any return value above 1
    Failed(u32),
}

impl NativeOutcome {
    /// Classify a raw return value
    pub fn from_return_value(code: u32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::OkRebootRequired,
            other => Self::Failed(other),
        }
    }

    /// Whether the call succeeded but needs a restart
    pub fn reboot_required(&self) -> bool {
        matches!(self, Self::OkRebootRequired)
    }

    /// Whether the call failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Execution status reported to the plugin orchestration engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Finished, continue the boot sequence
    Done,
    /// Finished, restart before running further plugins
    DoneRebootRequired,
}

/// Two-valued outcome consumed by the orchestration engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOutcome {
    pub status: ExecutionStatus,
    pub reboot_required: bool,
}

impl PluginOutcome {
    /// Build the outcome of an operation from its reboot flag
    pub fn from_reboot_required(reboot_required: bool) -> Self {
        let status = if reboot_required {
            ExecutionStatus::DoneRebootRequired
        } else {
            ExecutionStatus::Done
        };
        Self {
            status,
            reboot_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_value_ranges() {
        assert_eq!(NativeOutcome::from_return_value(0), NativeOutcome::Ok);
        assert_eq!(
            NativeOutcome::from_return_value(1),
            NativeOutcome::OkRebootRequired
        );
        assert_eq!(
            NativeOutcome::from_return_value(70),
            NativeOutcome::Failed(70)
        );
        assert!(NativeOutcome::from_return_value(1).reboot_required());
        assert!(!NativeOutcome::from_return_value(0).reboot_required());
        assert!(NativeOutcome::from_return_value(2).is_failure());
    }

    #[test]
    fn test_plugin_outcome_from_reboot_flag() {
        let done = PluginOutcome::from_reboot_required(false);
        assert_eq!(done.status, ExecutionStatus::Done);
        assert!(!done.reboot_required);

        let reboot = PluginOutcome::from_reboot_required(true);
        assert_eq!(reboot.status, ExecutionStatus::DoneRebootRequired);
        assert!(reboot.reboot_required);
    }

    #[test]
    fn test_plugin_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&PluginOutcome::from_reboot_required(true)).unwrap();
        assert_eq!(
            json,
            r#"{"status":"done_reboot_required","reboot_required":true}"#
        );
    }
}
