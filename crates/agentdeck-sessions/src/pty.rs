//! Pseudo-terminal process plumbing shared by the local and remote backends

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use crate::error::{Result, SessionError};

const READ_CHUNK_SIZE: usize = 8192;

/// Shared handle to the write side of a PTY
pub type PtyWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// What to run inside a new pseudo-terminal
#[derive(Debug, Clone)]
pub struct PtyCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
}

/// A child process attached to a pseudo-terminal
pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: PtyWriter,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

/// Read side of a spawned PTY, not yet pumping
///
/// Kept separate from [`PtyProcess`] so the caller can register the process
/// before any output is delivered.
pub struct OutputPump {
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtyProcess {
    pub fn spawn(command: &PtyCommand) -> Result<(Self, OutputPump)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: command.rows,
                cols: command.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::Spawn(format!("failed to open PTY: {}", e)))?;

        let mut builder = CommandBuilder::new(&command.program);
        builder.args(&command.args);
        if let Some(cwd) = &command.cwd {
            builder.cwd(cwd);
        }
        builder.env("TERM", "xterm-256color");
        builder.env("COLORTERM", "truecolor");

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| SessionError::Spawn(format!("{}: {}", command.program, e)))?;
        // The child holds its own copy; keeping ours would block EOF on the reader
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::Spawn(format!("failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::Spawn(format!("failed to take PTY writer: {}", e)))?;

        let process = Self {
            master: pair.master,
            writer: Arc::new(Mutex::new(writer)),
            killer: child.clone_killer(),
            pid: child.process_id(),
        };

        Ok((process, OutputPump { reader, child }))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn writer(&self) -> PtyWriter {
        Arc::clone(&self.writer)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::Teardown(format!("failed to resize PTY: {}", e)))
    }

    /// Terminate the child; the output pump observes EOF afterwards
    pub fn kill(&mut self) -> Result<()> {
        self.killer
            .kill()
            .map_err(|e| SessionError::Teardown(e.to_string()))
    }
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess").field("pid", &self.pid).finish()
    }
}

/// Write raw bytes to a PTY, flushing immediately
pub fn write_to_pty(writer: &PtyWriter, data: &[u8]) -> std::io::Result<()> {
    let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
    writer.write_all(data)?;
    writer.flush()
}

impl OutputPump {
    /// Start the background reader
    ///
    /// `on_output` receives decoded text in arrival order. `on_exit` runs once
    /// after the stream ends, before the child is reaped.
    pub fn start<O, E>(self, thread_name: String, mut on_output: O, on_exit: E) -> std::io::Result<()>
    where
        O: FnMut(&str) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let OutputPump { mut reader, mut child } = self;
        thread::Builder::new().name(thread_name).spawn(move || {
            let mut buffer = vec![0u8; READ_CHUNK_SIZE];
            let mut carry = Vec::new();

            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        let text = decode_utf8_chunk(&mut carry, &buffer[..n]);
                        if !text.is_empty() {
                            on_output(&text);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    // Linux reports EIO once the slave side is gone
                    Err(e) => {
                        debug!(error = %e, "PTY read ended");
                        break;
                    }
                }
            }

            if !carry.is_empty() {
                on_output(&String::from_utf8_lossy(&carry));
            }
            on_exit();

            match child.wait() {
                Ok(status) => debug!(exit_code = status.exit_code(), "PTY child reaped"),
                Err(e) => debug!(error = %e, "failed to reap PTY child"),
            }
        })?;
        Ok(())
    }
}

/// Decode `bytes` appended to `carry`, holding back an incomplete trailing sequence
///
/// Invalid sequences become U+FFFD. Whatever cannot be decoded yet is left in
/// `carry` for the next chunk.
pub(crate) fn decode_utf8_chunk(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);

    let mut out = String::with_capacity(carry.len());
    let remaining = {
        let mut rest: &[u8] = carry.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break 0;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => break after.len(),
                    }
                }
            }
        }
    };

    let consumed = carry.len() - remaining;
    carry.drain(..consumed);
    out
}
