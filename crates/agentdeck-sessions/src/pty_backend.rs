/// Local sessions backed by a pseudo-terminal process
use agentdeck_types::{Session, SessionStatus};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::backend::{LaunchRequest, SessionBackend};
use crate::command::{AgentCommand, CommandTarget};
use crate::error::Result;
use crate::paths::expand_tilde;
use crate::pty::{PtyCommand, PtyProcess};
use crate::registry::{SessionHandle, SessionRegistry};

pub struct LocalBackend {
    registry: SessionRegistry,
    size: (u16, u16),
}

impl LocalBackend {
    pub fn new(registry: SessionRegistry, size: (u16, u16)) -> Self {
        Self { registry, size }
    }
}

#[async_trait]
impl SessionBackend for LocalBackend {
    async fn launch(&self, request: LaunchRequest) -> Result<Session> {
        let mut session = request.session;
        let command = AgentCommand::resolve(
            session.agent_type,
            session.custom_command.as_deref(),
            session.flags.as_deref(),
            CommandTarget::Local,
        )?;

        let cwd = session.cwd.trim();
        let pty_command = PtyCommand {
            program: command.program.clone(),
            args: command.args.clone(),
            cwd: (!cwd.is_empty()).then(|| expand_tilde(cwd)),
            cols: self.size.0,
            rows: self.size.1,
        };

        match PtyProcess::spawn(&pty_command) {
            Ok((process, pump)) => {
                let session = self
                    .registry
                    .insert(session, Some(SessionHandle::Local(process)), self.size);
                info!(
                    session_id = %session.id,
                    command = %command.to_command_line(),
                    pid = ?session.pid,
                    "local session started"
                );
                self.registry.start_pump(&session.id, pump);
                Ok(session)
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    command = %command.to_command_line(),
                    error = %e,
                    "local spawn failed, session created offline"
                );
                session.status = SessionStatus::Offline;
                Ok(self.registry.insert(session, None, self.size))
            }
        }
    }

    fn backend_name(&self) -> &str {
        "local-pty"
    }
}
