use thiserror::Error;

/// Errors surfaced by the session orchestration layer
///
/// Local spawn failures never reach callers of `create_session`; they are
/// absorbed into an offline session. The variant exists for the backends'
/// internal plumbing and for logging.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed or unknown input at the API boundary
    #[error("invalid request: {0}")]
    Validation(String),

    /// Remote authentication or network failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// A local process could not be started
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Closing a process or channel failed
    #[error("teardown failed: {0}")]
    Teardown(String),

    /// The settings collaborator could not persist a change
    #[error("settings error: {0}")]
    Settings(String),
}

impl SessionError {
    pub fn validation(message: impl Into<String>) -> Self {
        SessionError::Validation(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        SessionError::Connection(message.into())
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        SessionError::Settings(format!("{:#}", err))
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
