use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use agentdeck_types::SessionStatus;
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};

/// Append-only JSON-lines record of a session's I/O
pub struct TranscriptLogger {
    session_id: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl TranscriptLogger {
    pub fn create(log_dir: &Path, session_id: &str) -> Result<Self> {
        std::fs::create_dir_all(log_dir).with_context(|| {
            format!("Failed to create transcript directory {}", log_dir.display())
        })?;

        let path = log_dir.join(format!("session-{}.log", session_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open transcript {}", path.display()))?;

        Ok(Self {
            session_id: session_id.to_string(),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_input(&self, data: &str) -> Result<()> {
        self.write_entry(json!({ "direction": "in", "data": data }))
    }

    pub fn log_output(&self, data: &str) -> Result<()> {
        self.write_entry(json!({ "direction": "out", "data": data }))
    }

    pub fn log_status(&self, status: SessionStatus) -> Result<()> {
        self.write_entry(json!({ "direction": "status", "status": status }))
    }

    pub fn log_resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.write_entry(json!({ "direction": "resize", "cols": cols, "rows": rows }))
    }

    fn write_entry(&self, mut entry: Value) -> Result<()> {
        if let Some(fields) = entry.as_object_mut() {
            fields.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
            fields.insert("session_id".into(), json!(self.session_id));
        }
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{}", entry).context("Failed to write transcript entry")?;
        file.flush()?;
        Ok(())
    }

    /// Hold the file lock, stalling writers until the guard drops
    #[cfg(test)]
    pub(crate) fn stall(&self) -> std::sync::MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TranscriptLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptLogger")
            .field("session_id", &self.session_id)
            .field("path", &self.path)
            .finish()
    }
}
