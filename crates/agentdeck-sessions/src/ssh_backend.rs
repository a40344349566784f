/// Remote sessions: an interactive channel over an SSH master connection
use agentdeck_types::Session;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::{LaunchRequest, SessionBackend};
use crate::command::{remote_command_line, AgentCommand, CommandTarget};
use crate::error::{Result, SessionError};
use crate::pty::{write_to_pty, PtyCommand, PtyProcess};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::ssh::SshConnector;

pub struct RemoteBackend {
    registry: SessionRegistry,
    connector: SshConnector,
    size: (u16, u16),
}

impl RemoteBackend {
    pub fn new(registry: SessionRegistry, connector: SshConnector, size: (u16, u16)) -> Self {
        Self {
            registry,
            connector,
            size,
        }
    }
}

#[async_trait]
impl SessionBackend for RemoteBackend {
    async fn launch(&self, request: LaunchRequest) -> Result<Session> {
        let session = request.session;
        let host = request
            .host
            .ok_or_else(|| SessionError::validation("remote session requires an SSH host"))?;

        let command = AgentCommand::resolve(
            session.agent_type,
            session.custom_command.as_deref(),
            session.flags.as_deref(),
            CommandTarget::Remote,
        )?;
        let line = remote_command_line(&session.cwd, &command);

        let mut connection = self.connector.connect(&host).await?;

        let channel_command = PtyCommand {
            program: self.connector.program().to_string(),
            args: self.connector.channel_args(&connection),
            cwd: None,
            cols: self.size.0,
            rows: self.size.1,
        };
        let (channel, pump) = match PtyProcess::spawn(&channel_command) {
            Ok(spawned) => spawned,
            Err(e) => {
                if let Err(close_err) = connection.close() {
                    debug!(error = %close_err, "closing master after channel failure");
                }
                return Err(SessionError::connection(format!(
                    "failed to open shell channel on {}: {}",
                    host.name, e
                )));
            }
        };

        // Typed ahead; the remote shell reads it once it is ready
        if let Err(e) = write_to_pty(&channel.writer(), format!("{}\n", line).as_bytes()) {
            let mut channel = channel;
            let _ = channel.kill();
            let _ = connection.close();
            return Err(SessionError::connection(format!(
                "failed to send command to {}: {}",
                host.name, e
            )));
        }

        let session = self.registry.insert(
            session,
            Some(SessionHandle::Remote {
                channel,
                connection,
            }),
            self.size,
        );
        info!(
            session_id = %session.id,
            host = %host.hostname,
            command = %line,
            "remote session started"
        );
        self.registry.start_pump(&session.id, pump);
        Ok(session)
    }

    fn backend_name(&self) -> &str {
        "ssh"
    }
}
