//! Agent command resolution and shell-metacharacter stripping
//!
//! Every token that comes from outside the orchestrator (custom command
//! parts, flags, the remote working directory) goes through [`sanitize`]
//! before it is placed into a command. Local sessions receive an argument
//! vector, so the filter is a second line of defense there. Remote sessions
//! receive one literal line typed into an interactive shell, where it is the
//! only defense.

use agentdeck_types::AgentType;

use crate::error::{Result, SessionError};

/// Characters removed from every externally supplied token
pub const FORBIDDEN_CHARS: [char; 14] = [
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '!', '<', '>', '\r', '\n',
];

/// Remove shell metacharacters and line breaks from `input`
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect()
}

/// Split on whitespace and sanitize each token, dropping tokens that end up empty
pub fn sanitize_tokens(input: &str) -> Vec<String> {
    input
        .split_whitespace()
        .map(sanitize)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Where the resolved command will be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTarget {
    Local,
    Remote,
}

/// Default program for an agent type
enum AgentProgram {
    Fixed(&'static str, &'static [&'static str]),
    LoginShell,
    UserSupplied,
}

/// Agent type to default executable mapping
///
/// Adding an agent type is a single new arm here; the match is exhaustive.
fn agent_program(agent_type: AgentType) -> AgentProgram {
    match agent_type {
        AgentType::ClaudeCode => AgentProgram::Fixed("claude", &[]),
        AgentType::Codex => AgentProgram::Fixed("codex", &[]),
        AgentType::Gemini => AgentProgram::Fixed("gemini", &[]),
        AgentType::Aider => AgentProgram::Fixed("aider", &[]),
        AgentType::OpenCode => AgentProgram::Fixed("opencode", &[]),
        AgentType::Shell => AgentProgram::LoginShell,
        AgentType::Custom => AgentProgram::UserSupplied,
    }
}

/// Executable plus argument vector for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AgentCommand {
    /// Resolve the command for an agent type, appending sanitized flags
    pub fn resolve(
        agent_type: AgentType,
        custom_command: Option<&str>,
        flags: Option<&str>,
        target: CommandTarget,
    ) -> Result<Self> {
        let mut command = match agent_program(agent_type) {
            AgentProgram::Fixed(program, args) => Self {
                program: program.to_string(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
            },
            AgentProgram::LoginShell => Self {
                program: match target {
                    CommandTarget::Local => sanitize(&local_shell()),
                    // Expanded by the remote shell, not by us
                    CommandTarget::Remote => "\"$SHELL\"".to_string(),
                },
                args: vec!["-l".to_string()],
            },
            AgentProgram::UserSupplied => {
                let mut tokens = sanitize_tokens(custom_command.unwrap_or_default()).into_iter();
                let program = tokens.next().ok_or_else(|| {
                    SessionError::validation("custom agent type requires a non-empty command")
                })?;
                Self {
                    program,
                    args: tokens.collect(),
                }
            }
        };

        if let Some(flags) = flags {
            command.args.extend(sanitize_tokens(flags));
        }

        Ok(command)
    }

    /// Space-joined form, suitable for logging or for a remote command line
    pub fn to_command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Compose the single line typed into a remote interactive shell
///
/// `cwd` is sanitized here; the command's tokens were sanitized when it was
/// resolved. A leading `~` stays outside the quotes so the remote shell can
/// expand it.
pub fn remote_command_line(cwd: &str, command: &AgentCommand) -> String {
    let cwd = sanitize(cwd);
    let cd_target = if cwd.is_empty() || cwd == "~" {
        "~".to_string()
    } else if let Some(rest) = cwd.strip_prefix("~/") {
        format!("~/{}", double_quote(rest))
    } else {
        double_quote(&cwd)
    };
    format!("cd {} && {}", cd_target, command.to_command_line())
}

/// Wrap in double quotes, escaping the two characters special inside them
/// that survive sanitizing
fn double_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn local_shell() -> String {
    if cfg!(windows) {
        return "cmd.exe".to_string();
    }
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.trim().is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string())
}
