use agentdeck_types::{Session, SessionLocation, SessionStatus};
use chrono::Local;
use colored::Colorize;

/// Table of saved sessions, oldest first
pub fn format_saved_sessions(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No saved sessions. Use --save with `launch` or `fleet` to keep one.".to_string();
    }

    let mut sorted: Vec<&Session> = sessions.iter().collect();
    sorted.sort_by_key(|session| session.created_at);

    sorted
        .into_iter()
        .map(|session| {
            let status = match session.status {
                SessionStatus::Offline => session.status.to_string().dimmed(),
                _ => session.status.to_string().green(),
            };
            let location = match (&session.location, &session.ssh_host_ref) {
                (SessionLocation::Remote, Some(host)) => format!("remote:{}", host),
                (location, _) => location.to_string(),
            };
            format!(
                "{:<20} {:<12} {:<24} {:<8} {:<16} {}",
                session.name.bold(),
                session.agent_type,
                location,
                status,
                session
                    .created_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M"),
                session.cwd
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
