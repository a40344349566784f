use agentdeck_types::SessionStatus;
use std::sync::{Arc, PoisonError, RwLock};

/// Receives every output chunk: `(session_id, data)`
pub type OutputHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Receives every status change: `(session_id, new_status)`
pub type StatusHandler = Arc<dyn Fn(&str, SessionStatus) + Send + Sync>;

/// Single-subscriber observer slots
///
/// Registering a handler replaces whatever was registered before; there is
/// exactly one downstream dispatcher at a time. Handlers are cloned out of
/// the slot before being called, so a handler may re-register itself.
#[derive(Default)]
pub struct EventSlots {
    output: RwLock<Option<OutputHandler>>,
    status: RwLock<Option<StatusHandler>>,
}

impl EventSlots {
    pub fn set_output_handler(&self, handler: OutputHandler) {
        *self.output.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn set_status_handler(&self, handler: StatusHandler) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub(crate) fn emit_output(&self, session_id: &str, data: &str) {
        let handler = self
            .output
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(session_id, data);
        }
    }

    pub(crate) fn emit_status(&self, session_id: &str, status: SessionStatus) {
        let handler = self
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(session_id, status);
        }
    }
}

impl std::fmt::Debug for EventSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_output = self
            .output
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        let has_status = self
            .status
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("EventSlots")
            .field("output_handler", &has_output)
            .field("status_handler", &has_status)
            .finish()
    }
}
