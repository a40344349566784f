//! End-to-end tests against real PTY processes
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentdeck_sessions::{OrchestratorConfig, SessionError, SessionManager};
use agentdeck_settings::SettingsManager;
use agentdeck_types::{
    AgentType, ManualHostConfig, SessionCategory, SessionConfig, SessionStatus,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

fn manager_with(settings: SettingsManager) -> SessionManager {
    let config = OrchestratorConfig::default().with_ssh_config_path(None);
    SessionManager::new(config, settings)
}

fn manager() -> SessionManager {
    manager_with(SettingsManager::new())
}

fn custom(name: &str, command: &str) -> SessionConfig {
    SessionConfig::local(name, AgentType::Custom, "/tmp").with_custom_command(command)
}

/// Poll until `condition` holds or the timeout expires
async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

#[tokio::test]
async fn test_local_shell_session() {
    let manager = manager();
    let session = manager
        .create_session(SessionConfig::local("t", AgentType::Shell, "/tmp"))
        .await
        .unwrap();

    assert_eq!(session.category, SessionCategory::Terminal);
    match session.status {
        SessionStatus::Idle => assert!(session.pid.unwrap_or(0) > 0),
        SessionStatus::Offline => assert_eq!(session.pid, None),
        other => panic!("unexpected status {:?}", other),
    }
    let stored = manager.get_session(&session.id).unwrap();
    assert_eq!(stored.to_config(), session.to_config());
    assert_eq!(stored.created_at, session.created_at);
}

#[tokio::test]
async fn test_input_is_echoed_into_buffer() {
    let manager = manager();
    let session = manager.create_session(custom("cat", "cat")).await.unwrap();
    assert_eq!(session.status, SessionStatus::Idle);

    assert!(manager.send_input(&session.id, "hello-agentdeck\n"));
    assert!(wait_for(|| manager.get_output_buffer(&session.id).contains("hello-agentdeck")).await);

    let refreshed = manager.get_session(&session.id).unwrap();
    assert!(refreshed.last_activity >= session.last_activity);
}

#[tokio::test]
async fn test_natural_exit_goes_offline_once() {
    let manager = manager();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    manager.set_status_handler(move |id, status| {
        sink.lock().unwrap().push((id.to_string(), status));
    });

    let session = manager
        .create_session(custom("echo", "echo exit-marker"))
        .await
        .unwrap();

    assert!(wait_for(|| manager
        .get_session(&session.id)
        .map(|s| s.status == SessionStatus::Offline)
        .unwrap_or(false))
    .await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let offline_events = events
        .lock()
        .unwrap()
        .iter()
        .filter(|(id, status)| id == &session.id && *status == SessionStatus::Offline)
        .count();
    assert_eq!(offline_events, 1);
    assert!(manager.get_output_buffer(&session.id).contains("exit-marker"));

    let exited = manager.get_session(&session.id).unwrap();
    assert_eq!(exited.pid, None);
    assert!(!manager.kill_session(&session.id));
}

#[tokio::test]
async fn test_kill_freezes_session() {
    let manager = manager();
    let kills = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&kills);
    manager.set_status_handler(move |_, status| {
        if status == SessionStatus::Offline {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let session = manager.create_session(custom("cat", "cat")).await.unwrap();
    assert!(manager.send_input(&session.id, "before-kill\n"));
    assert!(wait_for(|| manager.get_output_buffer(&session.id).contains("before-kill")).await);

    assert!(manager.kill_session(&session.id));
    let snapshot = manager.get_output_buffer(&session.id);
    assert_eq!(
        manager.get_session(&session.id).unwrap().status,
        SessionStatus::Offline
    );
    assert!(!manager.send_input(&session.id, "after-kill\n"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.get_output_buffer(&session.id), snapshot);
    assert_eq!(kills.load(Ordering::SeqCst), 1);

    assert!(!manager.kill_session(&session.id));
    assert!(!manager.kill_session("no-such-session"));
}

#[tokio::test]
async fn test_restart_allocates_new_id() {
    let manager = manager();
    let original = manager
        .create_session(custom("cat", "cat").with_flags("-u"))
        .await
        .unwrap();

    let restarted = manager.restart_session(&original.id).await.unwrap();
    assert_ne!(restarted.id, original.id);
    assert_eq!(restarted.to_config(), original.to_config());

    let ids: Vec<String> = manager
        .get_all_sessions()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert!(!ids.contains(&original.id));
    assert!(ids.contains(&restarted.id));

    assert!(manager.restart_session("no-such-session").await.is_none());
}

#[tokio::test]
async fn test_sessions_do_not_share_output() {
    let manager = manager();
    let first = manager.create_session(custom("one", "cat")).await.unwrap();
    let second = manager.create_session(custom("two", "cat")).await.unwrap();

    let (a, b) = tokio::join!(
        async { manager.send_input(&first.id, "token-one\n") },
        async { manager.send_input(&second.id, "token-two\n") },
    );
    assert!(a && b);

    assert!(wait_for(|| manager.get_output_buffer(&first.id).contains("token-one")).await);
    assert!(wait_for(|| manager.get_output_buffer(&second.id).contains("token-two")).await);
    assert!(!manager.get_output_buffer(&first.id).contains("token-two"));
    assert!(!manager.get_output_buffer(&second.id).contains("token-one"));
}

#[tokio::test]
async fn test_resize_is_clamped() {
    let manager = manager();
    let session = manager.create_session(custom("cat", "cat")).await.unwrap();
    assert_eq!(manager.pty_size(&session.id), Some((120, 30)));

    assert!(manager.resize_pty(&session.id, 9999, 9999));
    assert_eq!(manager.pty_size(&session.id), Some((500, 200)));

    assert!(manager.resize_pty(&session.id, 0, 0));
    assert_eq!(manager.pty_size(&session.id), Some((1, 1)));

    assert!(!manager.resize_pty("no-such-session", 80, 24));
}

#[tokio::test]
async fn test_missing_program_yields_offline_session() {
    let manager = manager();
    let session = manager
        .create_session(custom("ghost", "agentdeck-no-such-binary-xyz"))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Offline);
    assert_eq!(session.pid, None);
    assert!(manager.get_session(&session.id).is_some());
}

#[tokio::test]
async fn test_validation_errors() {
    let manager = manager();

    let err = manager.create_session(custom("empty", "  ")).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let err = manager
        .create_session(SessionConfig::local(" ", AgentType::Shell, "/tmp"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let mut remote = SessionConfig::remote("r", AgentType::Shell, "~", "unknown-host");
    let err = manager.create_session(remote.clone()).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    remote.ssh_host_ref = None;
    let err = manager.create_session(remote).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(manager.get_all_sessions().is_empty());
}

#[tokio::test]
async fn test_remote_connection_failure_is_reported() {
    let config = OrchestratorConfig::default()
        .with_ssh_config_path(None)
        .with_ssh_program("/nonexistent/agentdeck-ssh")
        .with_connect_timeout(Duration::from_secs(1));
    let manager = SessionManager::new(config, SettingsManager::new());

    let host = manager
        .add_manual_host(ManualHostConfig {
            name: "lab".into(),
            hostname: "lab.invalid".into(),
            port: Some(2222),
            user: Some("dev".into()),
            identity_file: Some("/no/such/key".into()),
        })
        .unwrap();
    manager.set_default_host(Some(&host.id)).unwrap();

    let mut config = SessionConfig::remote("r", AgentType::Codex, "/srv", "ignored");
    config.ssh_host_ref = None;
    let err = manager.create_session(config).await.unwrap_err();
    assert!(matches!(err, SessionError::Connection(_)));

    let result = manager.test_connection(&host).await;
    assert!(!result.success);
    assert!(manager.get_all_sessions().is_empty());
}

/// Stand-in `ssh` that records its arguments, accepts master and control
/// requests, and runs a local shell for the interactive channel
fn fake_ssh(dir: &Path) -> (PathBuf, PathBuf) {
    let log = dir.join("ssh.log");
    let script = dir.join("fake-ssh");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\ncase \" $* \" in\n  *\" -tt \"*) exec /bin/sh ;;\nesac\nexit 0\n",
            log.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, log)
}

fn ssh_log(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_remote_session_round_trip() {
    let dir = TempDir::new().unwrap();
    let (ssh, log) = fake_ssh(dir.path());
    let workdir = dir.path().join("quote\"dir");
    std::fs::create_dir(&workdir).unwrap();

    let mut config = OrchestratorConfig::default()
        .with_ssh_config_path(None)
        .with_ssh_program(ssh.display().to_string());
    config.control_dir = dir.path().join("control");
    let manager = SessionManager::new(config, SettingsManager::new());

    let host = manager
        .add_manual_host(ManualHostConfig {
            name: "lab".into(),
            hostname: "lab.internal".into(),
            port: Some(2222),
            user: Some("dev".into()),
            identity_file: Some(dir.path().join("no-such-key").display().to_string()),
        })
        .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    manager.set_status_handler(move |_, status| sink.lock().unwrap().push(status));

    let config = SessionConfig::remote(
        "remote",
        AgentType::Custom,
        workdir.display().to_string(),
        host.id.clone(),
    )
    .with_custom_command("printf started-%s ok");
    let session = manager.create_session(config).await.unwrap();
    assert_eq!(session.status, SessionStatus::Idle);
    assert_eq!(session.pid, None);
    assert_eq!(session.ssh_host_ref.as_deref(), Some(host.id.as_str()));

    // Only printed when the quoted cd succeeded
    assert!(
        wait_for(|| manager.get_output_buffer(&session.id).contains("started-ok")).await,
        "buffer: {:?}",
        manager.get_output_buffer(&session.id)
    );

    assert!(manager.send_input(&session.id, "exit\n"));
    assert!(wait_for(|| !events.lock().unwrap().is_empty()).await);
    assert!(wait_for(|| ssh_log(&log).iter().any(|l| l.contains("-O exit"))).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*events.lock().unwrap(), vec![SessionStatus::Offline]);
    assert_eq!(
        manager.get_session(&session.id).unwrap().status,
        SessionStatus::Offline
    );

    let calls = ssh_log(&log);
    let master = calls.iter().find(|l| l.starts_with("-M ")).unwrap();
    assert!(master.ends_with("lab.internal"));
    assert!(!master.split_whitespace().any(|arg| arg == "-i"));
    assert!(calls.iter().any(|l| l.starts_with("-tt ")));
    assert!(!manager.kill_session(&session.id));
}

#[tokio::test]
async fn test_virtual_team_session() {
    let manager = manager();
    let session = manager
        .create_session(
            SessionConfig::local("team", AgentType::ClaudeCode, "/tmp")
                .with_category(SessionCategory::VirtualTeam),
        )
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Idle);
    assert_eq!(session.pid, None);
    assert!(!manager.send_input(&session.id, "ignored\n"));
    assert!(!manager.resize_pty(&session.id, 80, 24));
    assert!(manager.update_session_status(&session.id, SessionStatus::Working));
    assert!(manager.kill_session(&session.id));
    assert_eq!(
        manager.get_session(&session.id).unwrap().status,
        SessionStatus::Offline
    );
}

#[tokio::test]
async fn test_output_handler_replacement() {
    let manager = manager();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    manager.set_output_handler(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&second);
    manager.set_output_handler(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let session = manager
        .create_session(custom("echo", "echo handler-check"))
        .await
        .unwrap();
    assert!(wait_for(|| manager.get_output_buffer(&session.id).contains("handler-check")).await);

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert!(second.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_persist_and_restore_placeholders() {
    let dir = TempDir::new().unwrap();
    let settings_file = dir.path().join("settings.toml");

    let live_id = {
        let manager = manager_with(SettingsManager::from_file(&settings_file).unwrap());
        let session = manager.create_session(custom("cat", "cat")).await.unwrap();
        manager.persist_sessions().unwrap();
        session.id
    };

    let manager = manager_with(SettingsManager::from_file(&settings_file).unwrap());
    assert!(manager.get_all_sessions().is_empty());
    assert_eq!(manager.restore_sessions(), 1);
    assert_eq!(manager.restore_sessions(), 0);

    let restored = manager.get_session(&live_id).unwrap();
    assert_eq!(restored.status, SessionStatus::Offline);
    assert_eq!(restored.pid, None);
    assert!(!manager.send_input(&live_id, "x"));
    assert!(!manager.kill_session(&live_id));

    let revived = manager.restart_session(&live_id).await.unwrap();
    assert_ne!(revived.id, live_id);
    assert!(manager.remove_session(&revived.id));
    assert!(!manager.remove_session(&revived.id));
}

#[tokio::test]
async fn test_status_updates_from_collaborator() {
    let manager = manager();
    let session = manager.create_session(custom("cat", "cat")).await.unwrap();

    assert!(manager.update_session_status(&session.id, SessionStatus::Working));
    assert_eq!(
        manager.get_session(&session.id).unwrap().status,
        SessionStatus::Working
    );
    assert!(!manager.update_session_status(&session.id, SessionStatus::Offline));
    assert!(!manager.update_session_status("no-such-session", SessionStatus::Waiting));

    manager.shutdown();
    assert_eq!(
        manager.get_session(&session.id).unwrap().status,
        SessionStatus::Offline
    );
}
