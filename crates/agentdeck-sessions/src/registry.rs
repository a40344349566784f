//! Shared session table
//!
//! One registry is shared by the manager, both backends and every output
//! pump thread. All bookkeeping happens under a single lock; handlers and
//! teardown always run after it is released.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentdeck_types::{Session, SessionStatus};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{EventSlots, OutputHandler, StatusHandler};
use crate::output_buffer::OutputBuffer;
use crate::pty::{write_to_pty, OutputPump, PtyProcess, PtyWriter};
use crate::ssh::SshConnection;
use crate::transcript::TranscriptLogger;

/// Backend resources that keep a session alive
#[derive(Debug)]
pub enum SessionHandle {
    Local(PtyProcess),
    Remote {
        channel: PtyProcess,
        connection: SshConnection,
    },
}

impl SessionHandle {
    /// Only local processes expose a pid
    pub fn pid(&self) -> Option<u32> {
        match self {
            SessionHandle::Local(process) => process.pid(),
            SessionHandle::Remote { .. } => None,
        }
    }

    fn pty(&self) -> &PtyProcess {
        match self {
            SessionHandle::Local(process) => process,
            SessionHandle::Remote { channel, .. } => channel,
        }
    }

    /// Kill the process or channel and release the connection behind it
    fn teardown(self) -> Result<()> {
        match self {
            SessionHandle::Local(mut process) => process.kill(),
            SessionHandle::Remote {
                mut channel,
                mut connection,
            } => {
                let channel_result = channel.kill();
                let connection_result = connection.close();
                channel_result.and(connection_result)
            }
        }
    }
}

struct ManagedEntry {
    session: Session,
    handle: Option<SessionHandle>,
    buffer: OutputBuffer,
    size: (u16, u16),
    transcript: Option<Arc<TranscriptLogger>>,
}

impl ManagedEntry {
    /// Flip to offline and hand back whatever was keeping the session alive
    fn go_offline(&mut self) -> Option<SessionHandle> {
        self.session.status = SessionStatus::Offline;
        self.session.pid = None;
        self.handle.take()
    }
}

/// Append to a transcript; callers must have released the registry lock
fn write_transcript<F>(id: &str, transcript: Option<Arc<TranscriptLogger>>, write: F)
where
    F: FnOnce(&TranscriptLogger) -> anyhow::Result<()>,
{
    if let Some(transcript) = transcript {
        if let Err(e) = write(&transcript) {
            debug!(session_id = id, error = %e, "transcript write failed");
        }
    }
}

struct RegistryInner {
    entries: Mutex<HashMap<String, ManagedEntry>>,
    events: EventSlots,
    buffer_limit: usize,
    transcript_dir: Option<PathBuf>,
}

/// Cheaply cloneable handle to the session table
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(buffer_limit: usize, transcript_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                events: EventSlots::default(),
                buffer_limit,
                transcript_dir,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ManagedEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_output_handler(&self, handler: OutputHandler) {
        self.inner.events.set_output_handler(handler);
    }

    pub fn set_status_handler(&self, handler: StatusHandler) {
        self.inner.events.set_status_handler(handler);
    }

    /// Register a session; the pid is taken from the handle
    pub fn insert(
        &self,
        mut session: Session,
        handle: Option<SessionHandle>,
        size: (u16, u16),
    ) -> Session {
        session.pid = handle.as_ref().and_then(SessionHandle::pid);

        let transcript = self.inner.transcript_dir.as_ref().and_then(|dir| {
            TranscriptLogger::create(dir, &session.id)
                .map(Arc::new)
                .map_err(|e| warn!(session_id = %session.id, error = %e, "transcript disabled"))
                .ok()
        });

        let entry = ManagedEntry {
            session: session.clone(),
            handle,
            buffer: OutputBuffer::with_limit(self.inner.buffer_limit),
            size,
            transcript,
        };
        let replaced = self.lock().insert(session.id.clone(), entry);

        if let Some(handle) = replaced.and_then(|old| old.handle) {
            discard(&session.id, handle);
        }
        session
    }

    /// Pump a spawned PTY's output into the session, flipping it offline at EOF
    pub(crate) fn start_pump(&self, session_id: &str, pump: OutputPump) {
        let output_registry = self.clone();
        let output_id = session_id.to_string();
        let exit_registry = self.clone();
        let exit_id = session_id.to_string();

        let short_id: String = session_id.chars().take(8).collect();
        let started = pump.start(
            format!("agentdeck-pty-{}", short_id),
            move |text| output_registry.record_output(&output_id, text),
            move || exit_registry.mark_exited(&exit_id),
        );

        if let Err(e) = started {
            warn!(session_id, error = %e, "failed to start output reader");
            self.mark_exited(session_id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.lock().get(id).map(|entry| entry.session.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// All sessions, oldest first
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .lock()
            .values()
            .map(|entry| entry.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Ids of sessions that still hold a live handle
    pub fn live_ids(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.handle.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn output(&self, id: &str) -> Option<String> {
        self.lock().get(id).map(|entry| entry.buffer.as_str().to_string())
    }

    pub fn size(&self, id: &str) -> Option<(u16, u16)> {
        self.lock().get(id).map(|entry| entry.size)
    }

    /// Append a chunk of output and notify the output handler
    pub fn record_output(&self, id: &str, data: &str) {
        let transcript = {
            let mut entries = self.lock();
            match entries.get_mut(id) {
                Some(entry) if !entry.session.status.is_offline() => {
                    entry.buffer.append(data);
                    entry.session.touch();
                    entry.transcript.clone()
                }
                _ => return,
            }
        };

        write_transcript(id, transcript, |t| t.log_output(data));
        self.inner.events.emit_output(id, data);
    }

    /// The process or channel went away on its own
    pub fn mark_exited(&self, id: &str) {
        let (handle, transcript) = {
            let mut entries = self.lock();
            match entries.get_mut(id) {
                Some(entry) if !entry.session.status.is_offline() => {
                    (entry.go_offline(), entry.transcript.clone())
                }
                _ => return,
            }
        };

        info!(session_id = id, "session exited");
        write_transcript(id, transcript, |t| t.log_status(SessionStatus::Offline));
        if let Some(handle) = handle {
            discard(id, handle);
        }
        self.inner.events.emit_status(id, SessionStatus::Offline);
    }

    /// Terminate a session; false when it is unknown or already offline
    pub fn kill(&self, id: &str) -> bool {
        let (handle, transcript) = {
            let mut entries = self.lock();
            match entries.get_mut(id) {
                Some(entry) if !entry.session.status.is_offline() => {
                    (entry.go_offline(), entry.transcript.clone())
                }
                _ => return false,
            }
        };

        write_transcript(id, transcript, |t| t.log_status(SessionStatus::Offline));
        if let Some(handle) = handle {
            discard(id, handle);
        }
        info!(session_id = id, "session killed");
        self.inner.events.emit_status(id, SessionStatus::Offline);
        true
    }

    /// Write raw input to the session's PTY
    pub fn send_input(&self, id: &str, data: &str) -> bool {
        let (writer, transcript): (PtyWriter, _) = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            let Some(handle) = entry.handle.as_ref() else {
                return false;
            };
            let writer = handle.pty().writer();
            entry.session.touch();
            (writer, entry.transcript.clone())
        };

        write_transcript(id, transcript, |t| t.log_input(data));

        match write_to_pty(&writer, data.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                debug!(session_id = id, error = %e, "input write failed");
                false
            }
        }
    }

    /// Resize the session's PTY; geometry must already be clamped
    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> bool {
        let transcript = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            let Some(handle) = entry.handle.as_ref() else {
                return false;
            };

            if let Err(e) = handle.pty().resize(cols, rows) {
                debug!(session_id = id, error = %e, "resize failed");
                return false;
            }
            entry.size = (cols, rows);
            entry.transcript.clone()
        };

        write_transcript(id, transcript, |t| t.log_resize(cols, rows));
        true
    }

    /// Externally reported activity state; offline is reserved for exit and kill
    pub fn update_status(&self, id: &str, status: SessionStatus) -> bool {
        if status.is_offline() {
            return false;
        }

        let transcript = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            if entry.session.status.is_offline() {
                return false;
            }
            if entry.session.status == status {
                return true;
            }
            entry.session.status = status;
            entry.session.touch();
            entry.transcript.clone()
        };

        write_transcript(id, transcript, |t| t.log_status(status));
        self.inner.events.emit_status(id, status);
        true
    }

    /// Drop a session from the table, tearing down anything still live
    pub fn remove(&self, id: &str) -> Option<Session> {
        let entry = self.lock().remove(id)?;
        if let Some(handle) = entry.handle {
            discard(id, handle);
        }
        Some(entry.session)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.lock().len())
            .field("events", &self.inner.events)
            .finish()
    }
}

/// Tear down a handle, tolerating processes that are already gone
fn discard(id: &str, handle: SessionHandle) {
    if let Err(e) = handle.teardown() {
        debug!(session_id = id, error = %e, "teardown reported an error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdeck_types::{AgentType, SessionConfig};
    use std::sync::Mutex as StdMutex;

    fn placeholder(name: &str) -> Session {
        Session::new(SessionConfig::local(name, AgentType::Shell, "/tmp"))
    }

    fn recorder(registry: &SessionRegistry) -> Arc<StdMutex<Vec<(String, SessionStatus)>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.set_status_handler(Arc::new(move |id, status| {
            sink.lock().unwrap().push((id.to_string(), status));
        }));
        seen
    }

    #[test]
    fn test_output_is_buffered_and_emitted() {
        let registry = SessionRegistry::new(8, None);
        let session = registry.insert(placeholder("a"), None, (120, 30));

        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&chunks);
        registry.set_output_handler(Arc::new(move |_, data| {
            sink.lock().unwrap().push(data.to_string());
        }));

        registry.record_output(&session.id, "hello ");
        registry.record_output(&session.id, "world");
        assert_eq!(registry.output(&session.id).unwrap(), "lo world");
        assert_eq!(*chunks.lock().unwrap(), vec!["hello ", "world"]);

        registry.record_output("missing", "x");
        assert_eq!(chunks.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_kill_is_terminal_and_fires_once() {
        let registry = SessionRegistry::new(1024, None);
        let session = registry.insert(placeholder("a"), None, (120, 30));
        let seen = recorder(&registry);

        registry.record_output(&session.id, "before");
        assert!(registry.kill(&session.id));
        assert!(!registry.kill(&session.id));
        registry.mark_exited(&session.id);
        registry.record_output(&session.id, "after");

        assert_eq!(registry.output(&session.id).unwrap(), "before");
        assert_eq!(registry.get(&session.id).unwrap().status, SessionStatus::Offline);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(session.id.clone(), SessionStatus::Offline)]
        );
        assert!(!registry.kill("missing"));
    }

    #[test]
    fn test_update_status_rules() {
        let registry = SessionRegistry::new(1024, None);
        let session = registry.insert(placeholder("a"), None, (120, 30));
        let seen = recorder(&registry);

        assert!(registry.update_status(&session.id, SessionStatus::Working));
        assert!(registry.update_status(&session.id, SessionStatus::Working));
        assert!(registry.update_status(&session.id, SessionStatus::Waiting));
        assert!(!registry.update_status(&session.id, SessionStatus::Offline));
        assert!(!registry.update_status("missing", SessionStatus::Idle));

        registry.kill(&session.id);
        assert!(!registry.update_status(&session.id, SessionStatus::Idle));

        let statuses: Vec<SessionStatus> = seen.lock().unwrap().iter().map(|(_, s)| *s).collect();
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Working,
                SessionStatus::Waiting,
                SessionStatus::Offline
            ]
        );
    }

    #[test]
    fn test_no_handle_means_no_io() {
        let registry = SessionRegistry::new(1024, None);
        let session = registry.insert(placeholder("a"), None, (120, 30));
        assert_eq!(session.pid, None);
        assert!(!registry.send_input(&session.id, "ls\n"));
        assert!(!registry.resize(&session.id, 80, 24));
        assert_eq!(registry.size(&session.id), Some((120, 30)));
        assert!(registry.live_ids().is_empty());
    }

    #[test]
    fn test_list_is_ordered_and_remove_forgets() {
        let registry = SessionRegistry::new(1024, None);
        let first = registry.insert(placeholder("first"), None, (120, 30));
        let mut later = placeholder("second");
        later.created_at = first.created_at + chrono::Duration::seconds(1);
        let second = registry.insert(later, None, (120, 30));

        let names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["first", "second"]);

        assert!(registry.remove(&first.id).is_some());
        assert!(registry.remove(&first.id).is_none());
        assert!(!registry.contains(&first.id));
        assert!(registry.contains(&second.id));
        assert_eq!(registry.output(&first.id), None);
    }

    #[test]
    fn test_transcript_written_when_configured() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = SessionRegistry::new(1024, Some(dir.path().to_path_buf()));
        let session = registry.insert(placeholder("a"), None, (120, 30));
        registry.record_output(&session.id, "out");
        registry.kill(&session.id);

        let log = std::fs::read_to_string(dir.path().join(format!("session-{}.log", session.id)))
            .unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn test_stalled_transcript_does_not_block_registry() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = SessionRegistry::new(1024, Some(dir.path().to_path_buf()));
        let slow = registry.insert(placeholder("slow"), None, (120, 30));
        let other = registry.insert(placeholder("other"), None, (120, 30));

        let transcript = registry
            .lock()
            .get(&slow.id)
            .and_then(|entry| entry.transcript.clone())
            .unwrap();
        let stall = transcript.stall();

        let writer_registry = registry.clone();
        let slow_id = slow.id.clone();
        let writer = std::thread::spawn(move || writer_registry.record_output(&slow_id, "out"));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while registry.output(&slow.id).as_deref() != Some("out") {
            assert!(std::time::Instant::now() < deadline, "output never recorded");
            std::thread::yield_now();
        }
        // The writer is parked on the transcript; the table stays usable
        registry.record_output(&other.id, "free");
        assert_eq!(registry.output(&other.id).unwrap(), "free");
        assert!(registry.update_status(&other.id, SessionStatus::Working));

        drop(stall);
        writer.join().unwrap();
        let log = std::fs::read_to_string(dir.path().join(format!("session-{}.log", slow.id)))
            .unwrap();
        assert!(log.contains("\"out\""));
    }
}
