//! Persisted operator settings
//!
//! Holds the manually registered SSH hosts, the default host reference used
//! when a remote session is requested without one, and the saved session list
//! that is reloaded as offline placeholders on the next start.

use agentdeck_types::{Session, SshHost};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// On-disk settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Host id used for remote sessions that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ssh_host: Option<String>,
    #[serde(default)]
    pub manual_hosts: Vec<SshHost>,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write settings file {}", path.as_ref().display()))?;
        Ok(())
    }
}

/// Shared handle to the settings, optionally backed by a file
///
/// Every mutation is written through to the file when one is configured.
#[derive(Clone, Debug)]
pub struct SettingsManager {
    settings: Arc<RwLock<Settings>>,
    settings_file: Option<PathBuf>,
}

impl SettingsManager {
    /// In-memory settings that are never written anywhere
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            settings_file: None,
        }
    }

    /// Load settings from a file, creating it with defaults when missing
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let settings = if path_buf.exists() {
            Settings::load_from_file(&path_buf)?
        } else {
            let settings = Settings::default();
            if let Some(parent) = path_buf.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
            settings.save_to_file(&path_buf)?;
            info!(path = %path_buf.display(), "created default settings file");
            settings
        };

        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            settings_file: Some(path_buf),
        })
    }

    pub fn settings_file(&self) -> Option<&Path> {
        self.settings_file.as_deref()
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    pub fn manual_hosts(&self) -> Vec<SshHost> {
        self.read().manual_hosts.clone()
    }

    pub fn add_manual_host(&self, host: SshHost) -> Result<()> {
        let mut settings = self.write();
        settings.manual_hosts.push(host);
        self.persist(&settings)
    }

    /// Remove a manual host; returns false when no host has that id
    pub fn remove_manual_host(&self, id: &str) -> Result<bool> {
        let mut settings = self.write();
        let before = settings.manual_hosts.len();
        settings.manual_hosts.retain(|host| host.id != id);
        if settings.manual_hosts.len() == before {
            return Ok(false);
        }
        if settings.default_ssh_host.as_deref() == Some(id) {
            settings.default_ssh_host = None;
        }
        self.persist(&settings)?;
        Ok(true)
    }

    pub fn default_ssh_host(&self) -> Option<String> {
        self.read().default_ssh_host.clone()
    }

    pub fn set_default_ssh_host(&self, id: Option<String>) -> Result<()> {
        let mut settings = self.write();
        settings.default_ssh_host = id;
        self.persist(&settings)
    }

    pub fn saved_sessions(&self) -> Vec<Session> {
        self.read().sessions.clone()
    }

    pub fn save_sessions(&self, sessions: Vec<Session>) -> Result<()> {
        let mut settings = self.write();
        settings.sessions = sessions;
        self.persist(&settings)
    }

    fn persist(&self, settings: &Settings) -> Result<()> {
        match self.settings_file {
            Some(ref path) => settings.save_to_file(path),
            None => Ok(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}
