use std::io::{Read, Write};
use std::sync::Arc;

use agentdeck_sessions::{paths::expand_tilde, SessionManager};
use agentdeck_types::{SessionConfig, SessionLocation, SessionStatus};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::LaunchArgs;

/// Build the session request described by `launch` arguments
pub fn session_config_from_args(args: &LaunchArgs) -> Result<SessionConfig> {
    let name = args.name.clone().unwrap_or_else(|| args.agent.to_string());
    let remote = args.remote || args.host.is_some();

    let mut config = if remote {
        // Remote paths are resolved by the far end
        let cwd = if args.cwd == "." { "~".to_string() } else { args.cwd.clone() };
        SessionConfig {
            location: SessionLocation::Remote,
            ssh_host_ref: args.host.clone(),
            ..SessionConfig::local(name, args.agent, cwd)
        }
    } else {
        let cwd = absolute_dir(&args.cwd)?;
        SessionConfig::local(name, args.agent, cwd)
    };

    if let Some(command) = &args.command {
        config = config.with_custom_command(command.clone());
    }
    if let Some(flags) = &args.flags {
        config = config.with_flags(flags.clone());
    }
    Ok(config)
}

fn absolute_dir(cwd: &str) -> Result<String> {
    let path = expand_tilde(cwd);
    let path = std::fs::canonicalize(&path)
        .with_context(|| format!("Working directory {} does not exist", path.display()))?;
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    Ok(path.display().to_string())
}

/// Start one session and pipe this terminal's stdin/stdout through it
pub async fn run_launch(args: &LaunchArgs, manager: Arc<SessionManager>) -> Result<()> {
    let config = session_config_from_args(args)?;

    manager.set_output_handler(|_, data| {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(data.as_bytes());
        let _ = stdout.flush();
    });
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    manager.set_status_handler(move |_, status| {
        let _ = status_tx.send(status);
    });

    let session = manager.create_session(config).await?;
    if session.status == SessionStatus::Offline {
        bail!(
            "{} could not be started (see log output for details)",
            session.agent_type
        );
    }
    eprintln!(
        "{} {} ({}) - Ctrl-C to stop",
        "Attached to".green(),
        session.name.bold(),
        session.id
    );

    if args.save {
        manager.persist_sessions()?;
    }

    forward_stdin(Arc::clone(&manager), session.id.clone())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                manager.kill_session(&session.id);
                break;
            }
            status = status_rx.recv() => match status {
                Some(SessionStatus::Offline) | None => break,
                Some(other) => debug!(status = %other, "status changed"),
            },
        }
    }

    eprintln!("\n{} {}", "Session ended:".yellow(), session.name);
    Ok(())
}

/// Copy stdin into the session on a background thread until either side closes
fn forward_stdin(manager: Arc<SessionManager>, session_id: String) -> Result<()> {
    std::thread::Builder::new()
        .name("agentdeck-stdin".to_string())
        .spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) => {
                        // EOF on our side becomes Ctrl-D for the agent
                        manager.send_input(&session_id, "\u{4}");
                        break;
                    }
                    Ok(n) => {
                        let text = String::from_utf8_lossy(&buffer[..n]);
                        if !manager.send_input(&session_id, &text) {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        })
        .context("Failed to start stdin forwarder")?;
    Ok(())
}
