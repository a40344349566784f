use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use agentdeck_sessions::SessionManager;
use agentdeck_types::{SessionConfig, SessionStatus};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

/// A TOML document listing sessions to start together
#[derive(Debug, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

impl FleetFile {
    pub fn parse(content: &str) -> Result<Self> {
        let fleet: FleetFile = toml::from_str(content).context("Failed to parse fleet file")?;
        if fleet.sessions.is_empty() {
            bail!("Fleet file contains no [[sessions]]");
        }
        Ok(fleet)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fleet file {}", path.display()))?;
        Self::parse(&content)
    }
}

/// Splits interleaved output chunks into whole lines per session
#[derive(Debug, Default)]
pub struct LinePrefixer {
    partial: HashMap<String, String>,
}

impl LinePrefixer {
    /// Complete lines made available by `chunk`, without line terminators
    pub fn push(&mut self, key: &str, chunk: &str) -> Vec<String> {
        let pending = self.partial.entry(key.to_string()).or_default();
        pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(end) = pending.find('\n') {
            let line: String = pending.drain(..=end).collect();
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Whatever is left over for `key`, if anything
    pub fn flush(&mut self, key: &str) -> Option<String> {
        self.partial
            .remove(key)
            .map(|rest| rest.trim_end_matches('\r').to_string())
            .filter(|rest| !rest.is_empty())
    }
}

type Names = Arc<Mutex<HashMap<String, String>>>;

fn label(names: &Names, id: &str) -> String {
    names
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
        .cloned()
        .unwrap_or_else(|| id.chars().take(8).collect())
}

/// Launch every session in the fleet file and stream prefixed output until all exit
pub async fn run_fleet(path: &Path, save: bool, manager: Arc<SessionManager>) -> Result<()> {
    let fleet = FleetFile::load(path)?;

    let names: Names = Arc::new(Mutex::new(HashMap::new()));
    let prefixer = Arc::new(Mutex::new(LinePrefixer::default()));

    let output_names = Arc::clone(&names);
    let output_prefixer = Arc::clone(&prefixer);
    manager.set_output_handler(move |id, data| {
        let lines = output_prefixer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id, data);
        if lines.is_empty() {
            return;
        }
        let name = label(&output_names, id);
        for line in lines {
            println!("{} {}", format!("[{}]", name).cyan(), line);
        }
    });

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    manager.set_status_handler(move |id, status| {
        let _ = status_tx.send((id.to_string(), status));
    });

    let mut launched = Vec::new();
    for config in fleet.sessions {
        let name = config.name.clone();
        match manager.create_session(config).await {
            Ok(session) => {
                names
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(session.id.clone(), session.name.clone());
                if session.status == SessionStatus::Offline {
                    eprintln!("{} {} could not be started", "✗".red(), session.name);
                } else {
                    eprintln!("{} {} ({})", "▶".green(), session.name.bold(), session.id);
                }
                launched.push(session.id);
            }
            Err(e) => {
                warn!(session = %name, error = %e, "failed to launch session");
                eprintln!("{} {}: {}", "✗".red(), name, e);
            }
        }
    }

    if save {
        manager.persist_sessions()?;
    }

    let all_offline = |manager: &SessionManager| {
        launched.iter().all(|id| {
            manager
                .get_session(id)
                .map(|s| s.status == SessionStatus::Offline)
                .unwrap_or(true)
        })
    };
    if all_offline(&manager) {
        bail!("No session in {} is running", path.display());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{}", "Stopping all sessions".yellow());
                manager.shutdown();
                break;
            }
            event = status_rx.recv() => {
                let Some((id, status)) = event else { break };
                let name = label(&names, &id);
                if status == SessionStatus::Offline {
                    let rest = prefixer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .flush(&id);
                    if let Some(rest) = rest {
                        println!("{} {}", format!("[{}]", name).cyan(), rest);
                    }
                }
                eprintln!("{} {}", format!("[{}]", name).cyan(), status.to_string().dimmed());
                if all_offline(&manager) {
                    break;
                }
            }
        }
    }

    Ok(())
}
