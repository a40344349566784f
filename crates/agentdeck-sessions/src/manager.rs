use std::sync::Arc;

use agentdeck_settings::SettingsManager;
use agentdeck_types::{
    ConnectionTestResult, ManualHostConfig, Session, SessionCategory, SessionConfig,
    SessionLocation, SessionStatus, SshHost, MAX_PTY_COLS, MAX_PTY_ROWS,
};
use tracing::{info, warn};

use crate::backend::{LaunchRequest, SessionBackend};
use crate::config::OrchestratorConfig;
use crate::error::{Result, SessionError};
use crate::hosts::HostDirectory;
use crate::pty_backend::LocalBackend;
use crate::registry::SessionRegistry;
use crate::ssh::SshConnector;
use crate::ssh_backend::RemoteBackend;

/// Clamp requested terminal geometry to the supported range
pub fn clamp_pty_size(cols: u32, rows: u32) -> (u16, u16) {
    let cols = cols.clamp(1, u32::from(MAX_PTY_COLS));
    let rows = rows.clamp(1, u32::from(MAX_PTY_ROWS));
    // Both fit in u16 after clamping
    (cols as u16, rows as u16)
}

/// Single entry point for session and host operations
pub struct SessionManager {
    registry: SessionRegistry,
    local: Box<dyn SessionBackend>,
    remote: Box<dyn SessionBackend>,
    connector: SshConnector,
    hosts: HostDirectory,
    settings: SettingsManager,
    initial_size: (u16, u16),
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("local", &self.local.backend_name())
            .field("remote", &self.remote.backend_name())
            .field("registry", &self.registry)
            .finish()
    }
}

impl SessionManager {
    pub fn new(config: OrchestratorConfig, settings: SettingsManager) -> Self {
        let registry = SessionRegistry::new(config.output_buffer_limit, config.transcript_dir);
        let connector = SshConnector::new(
            config.ssh_program,
            config.connect_timeout,
            config.control_dir,
        );

        Self {
            local: Box::new(LocalBackend::new(registry.clone(), config.initial_size)),
            remote: Box::new(RemoteBackend::new(
                registry.clone(),
                connector.clone(),
                config.initial_size,
            )),
            hosts: HostDirectory::new(config.ssh_config_path, settings.clone()),
            registry,
            connector,
            settings,
            initial_size: config.initial_size,
        }
    }

    /// Create and start a session
    ///
    /// A local spawn failure still yields a session, in `offline`. Remote
    /// requests fail on an unknown host or a failed connection.
    pub async fn create_session(&self, mut config: SessionConfig) -> Result<Session> {
        if config.name.trim().is_empty() {
            return Err(SessionError::validation("session name must not be empty"));
        }

        if config.category == SessionCategory::VirtualTeam {
            let session = self
                .registry
                .insert(Session::new(config), None, self.initial_size);
            info!(session_id = %session.id, name = %session.name, "virtual session created");
            return Ok(session);
        }

        match config.location {
            SessionLocation::Local => {
                let session = Session::new(config);
                self.local
                    .launch(LaunchRequest {
                        session,
                        host: None,
                    })
                    .await
            }
            SessionLocation::Remote => {
                let host = self.hosts.resolve(config.ssh_host_ref.as_deref())?;
                config.ssh_host_ref = Some(host.id.clone());
                let session = Session::new(config);
                self.remote
                    .launch(LaunchRequest {
                        session,
                        host: Some(host),
                    })
                    .await
            }
        }
    }

    pub fn send_input(&self, id: &str, data: &str) -> bool {
        self.registry.send_input(id, data)
    }

    pub fn resize_pty(&self, id: &str, cols: u32, rows: u32) -> bool {
        let (cols, rows) = clamp_pty_size(cols, rows);
        self.registry.resize(id, cols, rows)
    }

    pub fn kill_session(&self, id: &str) -> bool {
        self.registry.kill(id)
    }

    /// Replace a session with a fresh one built from the same configuration
    pub async fn restart_session(&self, id: &str) -> Option<Session> {
        let previous = self.registry.get(id)?;
        self.registry.kill(id);
        self.registry.remove(id);

        match self.create_session(previous.to_config()).await {
            Ok(session) => {
                info!(old_id = id, new_id = %session.id, "session restarted");
                Some(session)
            }
            Err(e) => {
                warn!(session_id = id, error = %e, "restart failed");
                None
            }
        }
    }

    /// Kill if needed and forget the session entirely
    pub fn remove_session(&self, id: &str) -> bool {
        self.registry.kill(id);
        self.registry.remove(id).is_some()
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.registry.get(id)
    }

    pub fn get_all_sessions(&self) -> Vec<Session> {
        self.registry.list()
    }

    pub fn get_output_buffer(&self, id: &str) -> String {
        self.registry.output(id).unwrap_or_default()
    }

    pub fn pty_size(&self, id: &str) -> Option<(u16, u16)> {
        self.registry.size(id)
    }

    pub fn update_session_status(&self, id: &str, status: SessionStatus) -> bool {
        self.registry.update_status(id, status)
    }

    pub fn set_output_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.registry.set_output_handler(Arc::new(handler));
    }

    pub fn set_status_handler<F>(&self, handler: F)
    where
        F: Fn(&str, SessionStatus) + Send + Sync + 'static,
    {
        self.registry.set_status_handler(Arc::new(handler));
    }

    /// Load saved sessions as offline placeholders; returns how many were added
    pub fn restore_sessions(&self) -> usize {
        let mut restored = 0;
        for saved in self.settings.saved_sessions() {
            if self.registry.contains(&saved.id) {
                continue;
            }
            self.registry
                .insert(saved.into_placeholder(), None, self.initial_size);
            restored += 1;
        }
        if restored > 0 {
            info!(count = restored, "restored saved sessions");
        }
        restored
    }

    /// Write the current session list to the settings store
    pub fn persist_sessions(&self) -> Result<()> {
        self.settings.save_sessions(self.registry.list())?;
        Ok(())
    }

    /// Kill every session that still has a live process or channel
    pub fn shutdown(&self) {
        for id in self.registry.live_ids() {
            self.registry.kill(&id);
        }
    }

    pub fn get_all_hosts(&self) -> Vec<SshHost> {
        self.hosts.all_hosts()
    }

    pub fn add_manual_host(&self, config: ManualHostConfig) -> Result<SshHost> {
        self.hosts.add_manual_host(config)
    }

    pub fn remove_host(&self, id: &str) -> bool {
        self.hosts.remove_host(id)
    }

    pub fn set_default_host(&self, id: Option<&str>) -> Result<()> {
        self.hosts.set_default(id)
    }

    pub fn default_host(&self) -> Option<String> {
        self.hosts.default_host()
    }

    pub async fn test_connection(&self, host: &SshHost) -> ConnectionTestResult {
        self.connector.test_connection(host).await
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
