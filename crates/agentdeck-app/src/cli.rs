use std::path::PathBuf;

use agentdeck_types::AgentType;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// CLI arguments for agentdeck
#[derive(Parser, Debug)]
#[command(name = "agentdeck")]
#[command(about = "Run coding agents in local and SSH terminal sessions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding settings.toml (default: platform data dir)
    #[arg(long, global = true, env = "AGENTDECK_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// SSH client config to discover hosts from
    #[arg(long, global = true, env = "AGENTDECK_SSH_CONFIG", value_name = "PATH")]
    pub ssh_config: Option<PathBuf>,

    /// Seconds to wait for an SSH connection
    #[arg(
        long,
        global = true,
        env = "AGENTDECK_CONNECT_TIMEOUT",
        default_value_t = agentdeck_types::DEFAULT_CONNECT_TIMEOUT_SECS
    )]
    pub connect_timeout: u64,

    /// Write per-session JSON-lines transcripts into this directory
    #[arg(long, global = true, env = "AGENTDECK_TRANSCRIPTS", value_name = "DIR")]
    pub transcripts: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage SSH hosts
    Hosts {
        #[command(subcommand)]
        command: HostCommands,
    },
    /// Start one session and attach this terminal to it
    Launch(LaunchArgs),
    /// Start every session described in a TOML file and stream their output
    Fleet {
        /// Fleet file with [[sessions]] tables
        file: PathBuf,
        /// Save the launched sessions to settings
        #[arg(long)]
        save: bool,
    },
    /// List sessions saved in settings
    Sessions,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum HostCommands {
    /// List hosts from the SSH config and manual registrations
    List,
    /// Register a host manually
    Add {
        /// Display name
        name: String,
        /// Hostname or address
        hostname: String,
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(short, long)]
        user: Option<String>,
        /// Private key to authenticate with
        #[arg(short, long, value_name = "PATH")]
        identity_file: Option<String>,
    },
    /// Remove a manually registered host
    Remove {
        /// Host id
        id: String,
    },
    /// Check that a host accepts a non-interactive login
    Test {
        /// Host id
        id: String,
    },
    /// Show, set, or clear the default host for remote sessions
    Default {
        /// Host id to make the default
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    /// Agent to run
    #[arg(short, long, default_value = "shell")]
    pub agent: AgentType,

    /// Session name (defaults to the agent name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Working directory
    #[arg(short = 'd', long, default_value = ".")]
    pub cwd: String,

    /// Command line for the custom agent type
    #[arg(short, long)]
    pub command: Option<String>,

    /// Extra arguments for the agent
    #[arg(short, long, allow_hyphen_values = true)]
    pub flags: Option<String>,

    /// Run on a remote host
    #[arg(short, long)]
    pub remote: bool,

    /// Host id for a remote session (implies --remote; defaults to the configured default host)
    #[arg(long, value_name = "ID")]
    pub host: Option<String>,

    /// Save the session to settings so it is listed later
    #[arg(long)]
    pub save: bool,
}
