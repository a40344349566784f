use agentdeck_sessions::{HostDirectory, SessionManager};
use agentdeck_types::{HostSource, ManualHostConfig, SshHost};
use anyhow::{anyhow, bail, Result};
use colored::Colorize;

use crate::cli::HostCommands;

/// Execute a `hosts` subcommand, returning the text to print
pub async fn run_hosts(command: &HostCommands, manager: &SessionManager) -> Result<String> {
    match command {
        HostCommands::List => Ok(format_host_list(
            &manager.get_all_hosts(),
            manager.default_host().as_deref(),
        )),
        HostCommands::Add {
            name,
            hostname,
            port,
            user,
            identity_file,
        } => {
            let host = manager.add_manual_host(ManualHostConfig {
                name: name.clone(),
                hostname: hostname.clone(),
                port: *port,
                user: user.clone(),
                identity_file: identity_file.clone(),
            })?;
            Ok(format!("Added host {} ({})", host.name.bold(), host.id))
        }
        HostCommands::Remove { id } => {
            let host = find_host(manager, id)?;
            if !HostDirectory::is_removable(&host) {
                bail!("'{}' comes from the SSH config file; edit that file to remove it", id);
            }
            if manager.remove_host(id) {
                Ok(format!("Removed host {}", host.name))
            } else {
                bail!("Failed to remove host '{}'", id)
            }
        }
        HostCommands::Test { id } => {
            let host = find_host(manager, id)?;
            let result = manager.test_connection(&host).await;
            if result.success {
                Ok(format!("{} {} is reachable", "✓".green(), host.name))
            } else {
                Err(anyhow!(
                    "{} is not reachable: {}",
                    host.name,
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                ))
            }
        }
        HostCommands::Default { id, clear } => {
            if *clear {
                manager.set_default_host(None)?;
                return Ok("Default host cleared".to_string());
            }
            match id {
                Some(id) => {
                    manager.set_default_host(Some(id))?;
                    Ok(format!("Default host set to {}", id))
                }
                None => Ok(manager
                    .default_host()
                    .unwrap_or_else(|| "No default host set".to_string())),
            }
        }
    }
}

fn find_host(manager: &SessionManager, id: &str) -> Result<SshHost> {
    manager
        .get_all_hosts()
        .into_iter()
        .find(|host| host.id == id)
        .ok_or_else(|| anyhow!("Unknown host '{}'", id))
}

pub fn format_host_list(hosts: &[SshHost], default_id: Option<&str>) -> String {
    if hosts.is_empty() {
        return "No hosts found. Add one with `agentdeck hosts add <name> <hostname>`.".to_string();
    }

    let mut lines = Vec::with_capacity(hosts.len());
    for host in hosts {
        let marker = if Some(host.id.as_str()) == default_id {
            "*"
        } else {
            " "
        };
        let target = match &host.user {
            Some(user) => format!("{}@{}:{}", user, host.hostname, host.port),
            None => format!("{}:{}", host.hostname, host.port),
        };
        let source = match host.source {
            HostSource::Config => "config".dimmed(),
            HostSource::Manual => "manual".normal(),
        };
        lines.push(format!(
            "{} {:<20} {:<36} {:<30} {}",
            marker,
            host.name.bold(),
            host.id,
            target,
            source
        ));
    }
    lines.join("\n")
}
