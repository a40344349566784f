use std::path::PathBuf;
use std::time::Duration;

use agentdeck_types::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PTY_COLS, DEFAULT_PTY_ROWS, OUTPUT_BUFFER_LIMIT,
};

use crate::paths::default_ssh_config_path;

/// Runtime knobs for the session manager
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// SSH client executable
    pub ssh_program: String,
    /// Client config to discover hosts from; `None` disables discovery
    pub ssh_config_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// Where multiplexing control sockets are created
    pub control_dir: PathBuf,
    /// Per-session JSON-lines transcripts are written here when set
    pub transcript_dir: Option<PathBuf>,
    pub output_buffer_limit: usize,
    /// Initial PTY geometry (cols, rows)
    pub initial_size: (u16, u16),
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            ssh_config_path: default_ssh_config_path(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            control_dir: std::env::temp_dir(),
            transcript_dir: None,
            output_buffer_limit: OUTPUT_BUFFER_LIMIT,
            initial_size: (DEFAULT_PTY_COLS, DEFAULT_PTY_ROWS),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_ssh_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.ssh_config_path = path;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_transcript_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.transcript_dir = dir;
        self
    }

    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }
}
