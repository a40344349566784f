use std::path::PathBuf;
use std::time::Duration;

use agentdeck_sessions::{paths::expand_tilde, OrchestratorConfig};
use agentdeck_settings::SettingsManager;
use anyhow::{Context, Result};

use crate::cli::Cli;

const SETTINGS_FILE: &str = "settings.toml";

/// Application configuration derived from CLI arguments and environment
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub settings: SettingsManager,
    pub orchestrator: OrchestratorConfig,
}

/// Set up application configuration from CLI arguments
pub fn setup_from_cli(cli: &Cli) -> Result<AppConfig> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsManager::from_file(data_dir.join(SETTINGS_FILE))?;

    let mut orchestrator = OrchestratorConfig::default()
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout.max(1)))
        .with_transcript_dir(cli.transcripts.clone());
    if let Some(path) = &cli.ssh_config {
        orchestrator = orchestrator
            .with_ssh_config_path(Some(expand_tilde(&path.to_string_lossy())));
    }

    Ok(AppConfig {
        data_dir,
        settings,
        orchestrator,
    })
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("agentdeck")
}
