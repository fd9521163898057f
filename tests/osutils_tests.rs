//! Tests for account, session, service and host operations

use cloudbase_init_rs::platform::mock::MockSystem;
use cloudbase_init_rs::platform::ServiceState;
use cloudbase_init_rs::{ExecutionStatus, OsConfig, OsError, OsUtils, PluginOutcome};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn utils(mock: &MockSystem) -> OsUtils {
    let config = OsConfig {
        service_stop_grace_secs: 0,
        ..Default::default()
    };
    OsUtils::new(&mock.platform(), &config)
}

// ==================== Account Tests ====================

/// A new account exists and has a SID after creation
#[tokio::test]
async fn test_create_alice() {
    let mock = MockSystem::new();
    let utils = utils(&mock);

    assert!(!utils.accounts.exists("alice").await.unwrap());
    assert_eq!(utils.accounts.sid("alice").await.unwrap(), None);

    assert_ok!(utils.accounts.create("alice", "Pwd!1", true).await);

    assert!(utils.accounts.exists("alice").await.unwrap());
    let sid = utils.accounts.sid("alice").await.unwrap().unwrap();
    assert!(sid.as_str().starts_with("S-1-5-21-"));
    assert_eq!(mock.password_expires("alice"), Some(true));
}

/// Account names are matched case-insensitively by the directory
#[tokio::test]
async fn test_exists_ignores_case() {
    let mock = MockSystem::new().with_account("Administrator", "x");
    assert!(utils(&mock).accounts.exists("administrator").await.unwrap());
}

/// Creating an existing account fails with the tool's message
#[tokio::test]
async fn test_create_existing_account_fails() {
    let mock = MockSystem::new().with_account("alice", "Pwd!1");

    let err = utils(&mock)
        .accounts
        .create("alice", "Other!2", false)
        .await
        .unwrap_err();

    match err {
        OsError::AccountOperation { account, message } => {
            assert_eq!(account, "alice");
            assert!(message.contains("already exists"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.password_of("alice").as_deref(), Some("Pwd!1"));
}

/// Changing a password also applies the expiration flag
#[tokio::test]
async fn test_set_password_updates_expiration() {
    let mock = MockSystem::new().with_account("bob", "old");
    let utils = utils(&mock);

    assert_ok!(utils.accounts.set_password("bob", "new", false).await);

    assert_eq!(mock.password_of("bob").as_deref(), Some("new"));
    assert_eq!(mock.password_expires("bob"), Some(false));
    assert_eq!(mock.executed_commands(), vec!["NET USER bob ***"]);
}

/// Passwords never appear in the recorded command lines
#[tokio::test]
async fn test_password_not_recorded() {
    let mock = MockSystem::new();
    assert_ok!(utils(&mock).accounts.create("carol", "TopSecret9", false).await);

    for command in mock.executed_commands() {
        assert!(!command.contains("TopSecret9"));
    }
}

/// Adding the same member twice succeeds both times
#[tokio::test]
async fn test_add_to_group_idempotent() {
    let mock = MockSystem::new()
        .with_account("alice", "Pwd!1")
        .with_group("Administrators");
    let utils = utils(&mock);

    assert_ok!(utils.accounts.add_to_local_group("alice", "Administrators").await);
    assert_ok!(utils.accounts.add_to_local_group("alice", "Administrators").await);

    assert_eq!(mock.group_members("Administrators"), vec!["alice"]);
}

#[tokio::test]
async fn test_add_to_group_failures() {
    let mock = MockSystem::new()
        .with_account("alice", "Pwd!1")
        .with_group("Administrators")
        .with_group("Users");
    let utils = utils(&mock);

    assert!(matches!(
        utils.accounts.add_to_local_group("alice", "Nope").await,
        Err(OsError::GroupNotFound(_))
    ));
    assert!(matches!(
        utils.accounts.add_to_local_group("ghost", "Administrators").await,
        Err(OsError::MemberNotFound(_))
    ));
    assert!(matches!(
        utils.accounts.add_to_local_group("Users", "Administrators").await,
        Err(OsError::InvalidMember(_))
    ));
}

// ==================== Session Tests ====================

/// Dropping a session releases the profile and the token
#[tokio::test]
async fn test_logon_session_lifecycle() {
    let mock = MockSystem::new();
    let utils = utils(&mock);
    assert_ok!(utils.accounts.create("svc", "Pwd!1", false).await);

    let session = utils
        .sessions
        .create_logon_session("svc", "Pwd!1", None, true)
        .unwrap();
    assert_eq!(session.username(), "svc");
    assert_eq!(mock.open_handle_count(), 1);
    assert_eq!(mock.loaded_profile_count(), 1);

    drop(session);
    assert_eq!(mock.open_handle_count(), 0);
    assert_eq!(mock.loaded_profile_count(), 0);
}

/// A failed profile load leaves no handle behind
#[test]
fn test_profile_failure_rolls_back() {
    let mock = MockSystem::new()
        .with_account("svc", "Pwd!1")
        .with_profile_load_failure();

    let result = utils(&mock)
        .sessions
        .create_logon_session("svc", "Pwd!1", None, true);

    assert!(matches!(result, Err(OsError::ProfileLoad { .. })));
    assert_eq!(mock.open_handle_count(), 0);
    assert_eq!(mock.loaded_profile_count(), 0);
}

#[test]
fn test_reboot_uses_configured_message() {
    let mock = MockSystem::new();
    assert_ok!(utils(&mock).sessions.reboot());
    assert_eq!(mock.reboot_message().as_deref(), Some("Cloudbase-Init reboot"));
}

// ==================== Service Tests ====================

#[tokio::test]
async fn test_terminate_stops_initializing_service() {
    let mock = MockSystem::new().with_service("cloudbase-init", ServiceState::Running);

    assert_ok!(utils(&mock).services.terminate().await);
    assert_eq!(
        mock.service_state("cloudbase-init"),
        Some(ServiceState::Stopped)
    );
}

/// The grace period elapses before the stop request
#[tokio::test]
async fn test_terminate_waits_grace_period() {
    let mock = MockSystem::new().with_service("acme-init", ServiceState::Running);
    let config = OsConfig {
        service_name: "acme-init".to_string(),
        service_stop_grace_secs: 1,
        ..Default::default()
    };
    let utils = OsUtils::new(&mock.platform(), &config);

    let started = std::time::Instant::now();
    assert_ok!(utils.services.terminate().await);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_stop_failure_code() {
    let mock = MockSystem::new()
        .with_service("Spooler", ServiceState::Running)
        .with_service_stop_code(2);

    let err = assert_err!(utils(&mock).services.stop("Spooler").await);
    assert!(matches!(err, OsError::ServiceStop { code: 2, .. }));
    assert_eq!(mock.service_state("Spooler"), Some(ServiceState::Running));
}

// ==================== Host Tests ====================

/// Renaming reports whether a restart is needed
#[tokio::test]
async fn test_rename_outcome() {
    let mock = MockSystem::new().with_computer_name("WIN-0001");
    let utils = utils(&mock);

    let changed = utils.host.rename("web-01").await.unwrap();
    let outcome = PluginOutcome::from_reboot_required(changed);
    assert_eq!(outcome.status, ExecutionStatus::DoneRebootRequired);

    let unchanged = utils.host.rename("WIN-0001").await.unwrap();
    assert_eq!(
        PluginOutcome::from_reboot_required(unchanged).status,
        ExecutionStatus::Done
    );
}

#[tokio::test]
async fn test_os_version_and_label() {
    let mock = MockSystem::new()
        .with_os_version("6.3.9600")
        .with_volume("C:\\", Some("Windows"));
    let utils = utils(&mock);

    assert_eq!(utils.host.os_version().await.unwrap(), "6.3.9600");
    assert_eq!(
        utils.host.volume_label("C:\\").await.unwrap().as_deref(),
        Some("Windows")
    );
}
