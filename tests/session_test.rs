//! Integration tests driving [`Session`] against a local mock of the
//! management CLI, spawned as a shell script in the PTY the real session
//! would run `ssh` in. The mock records every line it receives so command
//! sequences can be asserted.

use bmctty::{Error, PowerControl, PowerState, Session};
use std::fs;
use std::path::Path;

fn fixture() -> String {
    format!("{}/tests/fixtures/mock_imc.sh", env!("CARGO_MANIFEST_DIR"))
}

async fn mock_session(log: &Path) -> Session {
    let args = vec![fixture(), log.to_string_lossy().into_owned()];
    Session::spawn_with("sh", &args, None)
        .await
        .expect("failed to start mock session")
}

fn received(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(|line| line.to_string())
        .collect()
}

#[tokio::test]
async fn test_connect_discovers_prompt_token() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");

    let session = mock_session(&log).await;
    assert_eq!(session.to_string(), "sh [MOCKSRL]");
    session.close().unwrap();
}

#[tokio::test]
async fn test_absolute_command_navigates_from_top() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    let response = session.send_command("/chassis/show detail").await.unwrap();
    assert!(response.contains("Power: on"), "got: {response:?}");
    assert_eq!(session.scope(), "chassis");
    assert_eq!(
        received(&log),
        vec!["top", "scope chassis", "show detail | no-more"]
    );
}

#[tokio::test]
async fn test_pagination_modifier_applied_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    session.send_command("show detail").await.unwrap();
    assert_eq!(received(&log), vec!["show detail | no-more"]);
}

#[tokio::test]
async fn test_navigation_commands_go_out_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    session.send_command("scope chassis").await.unwrap();
    assert_eq!(session.scope(), "chassis");
    session.send_command("top").await.unwrap();
    assert_eq!(session.scope(), "");

    assert_eq!(received(&log), vec!["scope chassis", "top"]);
}

#[tokio::test]
async fn test_repeated_prompt_artifacts_removed() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    let response = session.send_command("show noisy").await.unwrap();
    assert_eq!(response, "\nreal line 1\nreal line 2\n");
}

#[tokio::test]
async fn test_error_line_reported_with_response() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    let err = session.send_command("show broken").await.unwrap_err();
    match err {
        Error::Command {
            cmd,
            response,
            reason,
        } => {
            assert_eq!(cmd, "show broken | no-more");
            assert_eq!(reason, "Error: unknown request");
            assert!(response.contains("Error: unknown request"));
        }
        other => panic!("expected command error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_confirmation_dialog_answered() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    session.power_cycle().await.unwrap();
    assert_eq!(
        received(&log),
        vec!["top", "scope chassis", "power cycle", "y"]
    );
}

#[tokio::test]
async fn test_power_state() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    assert_eq!(session.power_state().await.unwrap(), PowerState::On);
}

#[tokio::test]
async fn test_redfish_info_and_toggle() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    let info = session.redfish_info().await.unwrap();
    assert!(info.enabled);
    assert_eq!(info.active_sessions, 1);
    assert_eq!(info.max_sessions, 4);

    session.redfish_disable().await.unwrap();
    let info = session.redfish_info().await.unwrap();
    assert!(!info.enabled);

    let cmds = received(&log);
    assert!(cmds.contains(&"set enabled no".to_string()), "got: {cmds:?}");
    assert!(cmds.contains(&"commit".to_string()), "got: {cmds:?}");
}

#[tokio::test]
async fn test_console_bridge_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("cmds.log");
    let mut session = mock_session(&log).await;

    {
        let mut console = session.open_console().await.unwrap();
        console.send_line("uptime").unwrap();
    }
    session.close_console().await.unwrap();

    // The CLI regime is back in charge.
    let response = session.send_command("/chassis/show detail").await.unwrap();
    assert!(response.contains("Power: on"));
}
