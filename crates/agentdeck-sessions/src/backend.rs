/// Session backend abstraction for local PTY and remote SSH implementations
use agentdeck_types::{Session, SshHost};
use async_trait::async_trait;

use crate::error::Result;

/// Everything a backend needs to bring a session up
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Freshly constructed record; the backend owns it from here
    pub session: Session,
    /// Resolved target for remote sessions
    pub host: Option<SshHost>,
}

/// Establishes the process or channel behind a session
///
/// A backend registers the session in the shared registry itself and returns
/// the registered snapshot. Once registered, I/O and teardown go through the
/// registry regardless of which backend created the session.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<Session>;

    /// Backend name for logging
    fn backend_name(&self) -> &str;
}
