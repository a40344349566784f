//! Remote connections through the system OpenSSH client
//!
//! Each remote session gets its own multiplexing master (`ControlMaster`).
//! The master performs authentication once, non-interactively, and the
//! interactive channel for the session rides on its control socket. Closing
//! the connection asks the master to exit and removes the socket.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use agentdeck_types::{ConnectionTestResult, SshHost};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::paths::expand_tilde;

/// Extra time granted on top of ssh's own `ConnectTimeout` for authentication
const AUTH_GRACE: Duration = Duration::from_secs(5);
/// Upper bound on `ssh -O exit` during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(20);

static CONTROL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opens and probes connections using an `ssh` executable
#[derive(Debug, Clone)]
pub struct SshConnector {
    program: String,
    connect_timeout: Duration,
    control_dir: PathBuf,
}

impl SshConnector {
    pub fn new(program: impl Into<String>, connect_timeout: Duration, control_dir: PathBuf) -> Self {
        Self {
            program: program.into(),
            connect_timeout,
            control_dir,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Authenticate and leave a multiplexing master running in the background
    pub async fn connect(&self, host: &SshHost) -> Result<SshConnection> {
        validate_destination(host)?;
        std::fs::create_dir_all(&self.control_dir).map_err(|e| {
            SessionError::connection(format!(
                "cannot create control directory {}: {}",
                self.control_dir.display(),
                e
            ))
        })?;

        let control_path = self.control_dir.join(control_socket_name(host));
        let args = self.connect_args(host, &control_path);
        debug!(host = %host.hostname, port = host.port, "opening ssh master");

        self.run(&args)
            .await
            .map_err(|detail| SessionError::connection(format!("{}: {}", host.name, detail)))?;

        info!(host = %host.hostname, control = %control_path.display(), "ssh master established");
        Ok(SshConnection {
            program: self.program.clone(),
            host: host.clone(),
            control_path,
            closed: false,
        })
    }

    /// Authenticate, run nothing, and disconnect
    pub async fn test_connection(&self, host: &SshHost) -> ConnectionTestResult {
        if let Err(e) = validate_destination(host) {
            return ConnectionTestResult::failed(e.to_string());
        }
        match self.run(&self.probe_args(host)).await {
            Ok(()) => ConnectionTestResult::ok(),
            Err(detail) => {
                debug!(host = %host.hostname, %detail, "ssh probe failed");
                ConnectionTestResult::failed(detail)
            }
        }
    }

    /// Arguments for the interactive channel of an established connection
    pub fn channel_args(&self, connection: &SshConnection) -> Vec<String> {
        let mut args = vec![
            "-tt".to_string(),
            "-S".to_string(),
            connection.control_path.display().to_string(),
            "-o".to_string(),
            "ControlMaster=no".to_string(),
        ];
        args.extend(target_args(&connection.host));
        args.push(connection.host.hostname.clone());
        args
    }

    pub(crate) fn connect_args(&self, host: &SshHost, control_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-M".to_string(),
            "-N".to_string(),
            "-f".to_string(),
            "-o".to_string(),
            "ControlMaster=yes".to_string(),
            "-o".to_string(),
            "ControlPersist=yes".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", control_path.display()),
        ];
        args.extend(self.auth_args(host));
        args.push(host.hostname.clone());
        args
    }

    pub(crate) fn probe_args(&self, host: &SshHost) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "ControlMaster=no".to_string()];
        args.extend(self.auth_args(host));
        args.push(host.hostname.clone());
        args.push("exit".to_string());
        args
    }

    /// Non-interactive authentication options shared by master and probe
    fn auth_args(&self, host: &SshHost) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        args.extend(target_args(host));
        args.extend(identity_args(host));
        args
    }

    /// Run ssh to completion, returning the best available failure detail
    ///
    /// Only the exit status is awaited. A backgrounded master may keep
    /// inherited descriptors open, so stdout is discarded and stderr is read
    /// only after a failed exit.
    async fn run(&self, args: &[String]) -> std::result::Result<(), String> {
        let mut cmd = Command::new(&self.program);
        cmd.kill_on_drop(true);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("{}: {}", self.program, e))?;

        let limit = self.connect_timeout + AUTH_GRACE;
        let status = match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(format!("{}: {}", self.program, e)),
            Err(_) => {
                let _ = child.start_kill();
                return Err(format!("timed out after {}s", limit.as_secs()));
            }
        };

        if status.success() {
            return Ok(());
        }

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = timeout(Duration::from_secs(1), pipe.read_to_string(&mut stderr)).await;
        }
        let detail = stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string);

        Err(detail.unwrap_or_else(|| match status.code() {
            Some(code) => format!("ssh exited with {}", code),
            None => "ssh terminated by signal".to_string(),
        }))
    }
}

/// A live multiplexing master for one host
#[derive(Debug)]
pub struct SshConnection {
    program: String,
    host: SshHost,
    control_path: PathBuf,
    closed: bool,
}

impl SshConnection {
    pub fn host(&self) -> &SshHost {
        &self.host
    }

    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    /// Ask the master to exit and remove its socket. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut args = vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-O".to_string(),
            "exit".to_string(),
        ];
        args.extend(target_args(&self.host));
        args.push(self.host.hostname.clone());

        let status = std::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .and_then(|child| wait_bounded(child, CLOSE_TIMEOUT));
        let _ = std::fs::remove_file(&self.control_path);

        match status {
            Ok(Some(status)) if status.success() => {
                debug!(host = %self.host.hostname, "ssh master closed");
                Ok(())
            }
            Ok(Some(status)) => Err(SessionError::Teardown(format!(
                "ssh -O exit for {} returned {}",
                self.host.hostname, status
            ))),
            Ok(None) => Err(SessionError::Teardown(format!(
                "ssh -O exit for {} timed out after {}s",
                self.host.hostname,
                CLOSE_TIMEOUT.as_secs()
            ))),
            Err(e) => Err(SessionError::Teardown(format!("{}: {}", self.program, e))),
        }
    }
}

/// Wait for `child` until `limit`, killing it if it is still running then
///
/// `Ok(None)` means the deadline passed. Teardown runs from synchronous
/// callers, so this polls instead of awaiting.
fn wait_bounded(
    mut child: std::process::Child,
    limit: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(CLOSE_POLL_INTERVAL);
    }
}

impl Drop for SshConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close ssh master");
        }
    }
}

fn target_args(host: &SshHost) -> Vec<String> {
    let mut args = vec!["-p".to_string(), host.port.to_string()];
    if let Some(user) = host.user.as_deref().filter(|u| !u.is_empty()) {
        args.push("-l".to_string());
        args.push(user.to_string());
    }
    args
}

/// `-i` only when the key file is actually present
pub(crate) fn identity_args(host: &SshHost) -> Vec<String> {
    match host.identity_file.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => {
            let expanded = expand_tilde(path);
            if expanded.is_file() {
                vec!["-i".to_string(), expanded.display().to_string()]
            } else {
                debug!(path = %expanded.display(), "identity file not found, using agent/default keys");
                Vec::new()
            }
        }
        None => Vec::new(),
    }
}

/// Reject values ssh would parse as options
pub(crate) fn validate_destination(host: &SshHost) -> Result<()> {
    let unsafe_value =
        |value: &str| value.starts_with('-') || value.chars().any(|c| c.is_whitespace() || c.is_control());

    if host.hostname.is_empty() || unsafe_value(&host.hostname) {
        return Err(SessionError::validation(format!(
            "invalid hostname '{}'",
            host.hostname
        )));
    }
    if let Some(user) = &host.user {
        if unsafe_value(user) {
            return Err(SessionError::validation(format!("invalid user '{}'", user)));
        }
    }
    if host.port == 0 {
        return Err(SessionError::validation("port must be between 1 and 65535"));
    }
    Ok(())
}

/// Short, unique socket name; Unix socket paths are length-limited
fn control_socket_name(host: &SshHost) -> String {
    let mut hasher = DefaultHasher::new();
    host.id.hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    CONTROL_COUNTER.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
    if let Ok(elapsed) = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        elapsed.as_nanos().hash(&mut hasher);
    }
    format!("ad-{:016x}.sock", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdeck_types::HostSource;
    use tempfile::TempDir;

    fn host(identity_file: Option<String>) -> SshHost {
        SshHost {
            id: "h1".into(),
            name: "build box".into(),
            hostname: "build.example.com".into(),
            port: 2222,
            user: Some("dev".into()),
            identity_file,
            source: HostSource::Manual,
        }
    }

    fn connector() -> SshConnector {
        SshConnector::new("ssh", Duration::from_secs(7), std::env::temp_dir())
    }

    #[test]
    fn test_connect_args_shape() {
        let args = connector().connect_args(&host(None), Path::new("/tmp/ad-1.sock"));
        assert_eq!(&args[..3], &["-M", "-N", "-f"]);
        assert!(args.contains(&"ControlPath=/tmp/ad-1.sock".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=7".to_string()));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.windows(2).any(|w| w == ["-l", "dev"]));
        assert_eq!(args.last().map(String::as_str), Some("build.example.com"));
        assert!(!args.contains(&"-i".to_string()));
    }

    #[test]
    fn test_missing_identity_file_is_skipped() {
        let missing = host(Some("/definitely/not/here/id_ed25519".into()));
        assert!(identity_args(&missing).is_empty());
    }

    #[test]
    fn test_existing_identity_file_is_passed() {
        let dir = TempDir::new().unwrap();
        let key = dir.path().join("id_test");
        std::fs::write(&key, "key").unwrap();
        let present = host(Some(key.display().to_string()));
        assert_eq!(
            identity_args(&present),
            vec!["-i".to_string(), key.display().to_string()]
        );
    }

    #[test]
    fn test_probe_args_run_exit() {
        let args = connector().probe_args(&host(None));
        assert_eq!(
            &args[args.len() - 2..],
            &["build.example.com".to_string(), "exit".to_string()]
        );
    }

    #[test]
    fn test_validate_destination() {
        assert!(validate_destination(&host(None)).is_ok());

        let mut bad = host(None);
        bad.hostname = "-oProxyCommand=touch /tmp/x".into();
        assert!(matches!(
            validate_destination(&bad),
            Err(SessionError::Validation(_))
        ));

        let mut bad = host(None);
        bad.user = Some("a b".into());
        assert!(validate_destination(&bad).is_err());

        let mut bad = host(None);
        bad.port = 0;
        assert!(validate_destination(&bad).is_err());
    }

    #[test]
    fn test_control_socket_names_are_unique() {
        let h = host(None);
        assert_ne!(control_socket_name(&h), control_socket_name(&h));
        assert!(control_socket_name(&h).len() < 32);
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_bounded_kills_hung_child() {
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let started = Instant::now();
        let status = wait_bounded(child, Duration::from_millis(200)).unwrap();
        assert!(status.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));

        let child = std::process::Command::new("true").spawn().unwrap();
        let status = wait_bounded(child, Duration::from_secs(10)).unwrap();
        assert!(status.is_some_and(|s| s.success()));
    }

    #[tokio::test]
    async fn test_missing_ssh_program_reports_failure() {
        let connector = SshConnector::new(
            "/nonexistent/agentdeck-ssh",
            Duration::from_secs(1),
            std::env::temp_dir(),
        );
        let result = connector.test_connection(&host(None)).await;
        assert!(!result.success);
        assert!(result.error.is_some());

        let err = connector.connect(&host(None)).await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
    }
}
