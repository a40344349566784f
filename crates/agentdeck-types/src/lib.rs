//! Core types shared across the agentdeck crates
//!
//! This crate holds the externally visible session record, the request used to
//! create one, and the SSH host model. Nothing in here owns a process or a
//! connection; those live in `agentdeck-sessions`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Size of the per-session trailing output window, in bytes
pub const OUTPUT_BUFFER_LIMIT: usize = 50 * 1024;

/// Initial pseudo-terminal geometry for every spawned session
pub const DEFAULT_PTY_COLS: u16 = 120;
pub const DEFAULT_PTY_ROWS: u16 = 30;

/// Geometry bounds enforced on resize requests coming from a front end
pub const MAX_PTY_COLS: u16 = 500;
pub const MAX_PTY_ROWS: u16 = 200;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connect timeout for remote hosts when none is configured
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Tags
// ============================================================================

/// Error returned when a textual tag does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

/// The kind of agent a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    ClaudeCode,
    Codex,
    Gemini,
    Aider,
    OpenCode,
    /// The user's login shell
    Shell,
    /// Executable and arguments come from the session's custom command
    Custom,
}

impl AgentType {
    pub const ALL: [AgentType; 7] = [
        AgentType::ClaudeCode,
        AgentType::Codex,
        AgentType::Gemini,
        AgentType::Aider,
        AgentType::OpenCode,
        AgentType::Shell,
        AgentType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ClaudeCode => "claude-code",
            AgentType::Codex => "codex",
            AgentType::Gemini => "gemini",
            AgentType::Aider => "aider",
            AgentType::OpenCode => "opencode",
            AgentType::Shell => "shell",
            AgentType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "claude-code" | "claude" => Ok(AgentType::ClaudeCode),
            other => AgentType::ALL
                .iter()
                .copied()
                .find(|agent| agent.as_str() == other)
                .ok_or_else(|| UnknownTag {
                    kind: "agent type",
                    value: s.to_string(),
                }),
        }
    }
}

/// Where a session's process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionLocation {
    #[default]
    Local,
    Remote,
}

impl std::fmt::Display for SessionLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionLocation::Local => write!(f, "local"),
            SessionLocation::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for SessionLocation {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(SessionLocation::Local),
            "remote" | "ssh" => Ok(SessionLocation::Remote),
            _ => Err(UnknownTag {
                kind: "session location",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether a session is backed by a process at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionCategory {
    #[default]
    Terminal,
    /// Representational only; never has a process or channel
    VirtualTeam,
}

/// Lifecycle state of a session
///
/// `Offline` is terminal for the backing process: nothing moves a session out
/// of it except a restart, which creates a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Working,
    Waiting,
    Offline,
}

impl SessionStatus {
    pub fn is_offline(&self) -> bool {
        matches!(self, SessionStatus::Offline)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Working => write!(f, "working"),
            SessionStatus::Waiting => write!(f, "waiting"),
            SessionStatus::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Ok(SessionStatus::Idle),
            "working" => Ok(SessionStatus::Working),
            "waiting" => Ok(SessionStatus::Waiting),
            "offline" => Ok(SessionStatus::Offline),
            _ => Err(UnknownTag {
                kind: "session status",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Request to create a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub name: String,
    pub agent_type: AgentType,
    #[serde(default)]
    pub location: SessionLocation,
    /// Id of the SSH host to use; only read for remote sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_host_ref: Option<String>,
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_command: Option<String>,
    /// Extra whitespace-separated arguments appended to the agent command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(default)]
    pub category: SessionCategory,
}

impl SessionConfig {
    pub fn local(name: impl Into<String>, agent_type: AgentType, cwd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type,
            location: SessionLocation::Local,
            ssh_host_ref: None,
            cwd: cwd.into(),
            custom_command: None,
            flags: None,
            category: SessionCategory::Terminal,
        }
    }

    pub fn remote(
        name: impl Into<String>,
        agent_type: AgentType,
        cwd: impl Into<String>,
        ssh_host_ref: impl Into<String>,
    ) -> Self {
        Self {
            location: SessionLocation::Remote,
            ssh_host_ref: Some(ssh_host_ref.into()),
            ..Self::local(name, agent_type, cwd)
        }
    }

    pub fn with_custom_command(mut self, command: impl Into<String>) -> Self {
        self.custom_command = Some(command.into());
        self
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = Some(flags.into());
        self
    }

    pub fn with_category(mut self, category: SessionCategory) -> Self {
        self.category = category;
        self
    }
}

/// The externally visible session record
///
/// Callers only ever receive copies of this; the live record stays inside the
/// session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub agent_type: AgentType,
    pub location: SessionLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_host_ref: Option<String>,
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(default)]
    pub category: SessionCategory,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Build a fresh record with a newly generated id
    pub fn new(config: SessionConfig) -> Self {
        let now = Utc::now();
        let ssh_host_ref = match config.location {
            SessionLocation::Remote => config.ssh_host_ref,
            SessionLocation::Local => None,
        };
        Self {
            id: Uuid::new_v4().to_string(),
            name: config.name,
            agent_type: config.agent_type,
            location: config.location,
            ssh_host_ref,
            cwd: config.cwd,
            custom_command: config.custom_command,
            flags: config.flags,
            category: config.category,
            status: SessionStatus::Idle,
            pid: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// Cold placeholder for a session reloaded from persisted state
    pub fn into_placeholder(mut self) -> Self {
        self.status = SessionStatus::Offline;
        self.pid = None;
        self
    }

    /// The configuration this session was created from
    pub fn to_config(&self) -> SessionConfig {
        SessionConfig {
            name: self.name.clone(),
            agent_type: self.agent_type,
            location: self.location,
            ssh_host_ref: self.ssh_host_ref.clone(),
            cwd: self.cwd.clone(),
            custom_command: self.custom_command.clone(),
            flags: self.flags.clone(),
            category: self.category,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.category == SessionCategory::VirtualTeam
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

// ============================================================================
// SSH Hosts
// ============================================================================

/// Where a host entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostSource {
    /// Parsed from the user's SSH client configuration
    Config,
    #[default]
    Manual,
}

/// A remote host sessions can be launched on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshHost {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub source: HostSource,
}

impl SshHost {
    /// Register a manual host under a freshly generated id
    pub fn from_manual(config: ManualHostConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: config.name,
            hostname: config.hostname,
            port: config.port.unwrap_or(DEFAULT_SSH_PORT),
            user: config.user.filter(|u| !u.trim().is_empty()),
            identity_file: config.identity_file.filter(|p| !p.trim().is_empty()),
            source: HostSource::Manual,
        }
    }
}

/// Input for registering a host by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualHostConfig {
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub identity_file: Option<String>,
}

/// Outcome of a connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
