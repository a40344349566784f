use std::path::PathBuf;

use agentdeck_settings::SettingsManager;
use agentdeck_types::{HostSource, ManualHostConfig, SshHost};
use tracing::{info, warn};

use crate::error::{Result, SessionError};
use crate::ssh::validate_destination;
use crate::ssh_config::load_ssh_config_hosts;

/// Every host a remote session can target
///
/// Config-file hosts are re-read on each query so edits to the file show up
/// without a restart. Manual hosts live in the settings.
#[derive(Debug, Clone)]
pub struct HostDirectory {
    ssh_config_path: Option<PathBuf>,
    settings: SettingsManager,
}

impl HostDirectory {
    pub fn new(ssh_config_path: Option<PathBuf>, settings: SettingsManager) -> Self {
        Self {
            ssh_config_path,
            settings,
        }
    }

    /// Config-file hosts followed by manual hosts
    pub fn all_hosts(&self) -> Vec<SshHost> {
        let mut hosts = self
            .ssh_config_path
            .as_deref()
            .map(load_ssh_config_hosts)
            .unwrap_or_default();
        hosts.extend(self.settings.manual_hosts());
        hosts
    }

    pub fn find(&self, id: &str) -> Option<SshHost> {
        self.all_hosts().into_iter().find(|host| host.id == id)
    }

    pub fn add_manual_host(&self, config: ManualHostConfig) -> Result<SshHost> {
        if config.name.trim().is_empty() {
            return Err(SessionError::validation("host name must not be empty"));
        }
        let host = SshHost::from_manual(ManualHostConfig {
            name: config.name.trim().to_string(),
            hostname: config.hostname.trim().to_string(),
            ..config
        });
        validate_destination(&host)?;

        self.settings.add_manual_host(host.clone())?;
        info!(id = %host.id, hostname = %host.hostname, "registered manual host");
        Ok(host)
    }

    /// Remove a manual host; config-file hosts cannot be removed here
    pub fn remove_host(&self, id: &str) -> bool {
        match self.settings.remove_manual_host(id) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(id, error = %e, "failed to remove host");
                false
            }
        }
    }

    /// The host a remote session should use: an explicit reference or the default
    pub fn resolve(&self, host_ref: Option<&str>) -> Result<SshHost> {
        let id = host_ref
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.settings.default_ssh_host())
            .ok_or_else(|| {
                SessionError::validation("remote session requires an SSH host and no default is set")
            })?;

        self.find(&id)
            .ok_or_else(|| SessionError::validation(format!("unknown SSH host '{}'", id)))
    }

    pub fn set_default(&self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if self.find(id).is_none() {
                return Err(SessionError::validation(format!("unknown SSH host '{}'", id)));
            }
        }
        self.settings
            .set_default_ssh_host(id.map(str::to_string))?;
        Ok(())
    }

    pub fn default_host(&self) -> Option<String> {
        self.settings.default_ssh_host()
    }

    pub fn is_removable(host: &SshHost) -> bool {
        host.source == HostSource::Manual
    }
}
