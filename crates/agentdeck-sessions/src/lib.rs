//! Session orchestration for interactive coding agents
//!
//! Sessions run locally inside a pseudo-terminal or remotely over SSH. The
//! [`SessionManager`] is the only entry point callers need; everything else
//! is exported for embedding and tests.

pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod hosts;
pub mod manager;
pub mod output_buffer;
pub mod paths;
pub mod pty;
pub mod pty_backend;
pub mod registry;
pub mod ssh;
pub mod ssh_backend;
pub mod ssh_config;
pub mod transcript;

pub use command::{remote_command_line, sanitize, AgentCommand, CommandTarget, FORBIDDEN_CHARS};
pub use config::OrchestratorConfig;
pub use error::{Result, SessionError};
pub use hosts::HostDirectory;
pub use manager::{clamp_pty_size, SessionManager};
pub use output_buffer::OutputBuffer;
pub use ssh_config::parse_ssh_config;
