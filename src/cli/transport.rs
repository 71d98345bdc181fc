//! Interactive text sessions: spawn a transport command, send input and wait
//! for one of several patterns with a timeout.

use regex::Regex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device target is empty")]
    EmptyCommand,
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },
    #[error("session write failed: {0}")]
    Write(#[from] io::Error),
    #[error("session is closed")]
    Closed,
}

/// Result of waiting for output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Index of the pattern that matched
    Matched(usize),
    Timeout,
    Eof,
}

pub trait Session: Send {
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Wait until one of `patterns` matches the buffered output.
    ///
    /// The pattern whose match starts earliest wins, ties go to the lowest
    /// index. With an empty pattern list this only waits for timeout or EOF.
    fn expect(&mut self, patterns: &[Regex], timeout: Duration) -> Expectation;

    /// Output preceding the last match, or everything buffered after a
    /// timeout or EOF
    fn before(&self) -> &str;

    fn close(&mut self);
}

/// Opens sessions from a device target such as `telnet localhost 30000`
pub trait Spawner: Send {
    fn spawn(&mut self, command: &str) -> Result<Box<dyn Session>, TransportError>;
}

/// Pending output plus the `before` text of the last expectation.
///
/// Shared by every [`Session`] implementation so matching behaves the same
/// for real processes and scripted sessions.
#[derive(Debug, Default, Clone)]
pub struct ExpectBuffer {
    pending: String,
    before: String,
}

impl ExpectBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.pending.push_str(chunk);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Try the patterns against pending output. On a match, `before` becomes
    /// the text preceding it and pending keeps what follows.
    pub fn try_match(&mut self, patterns: &[Regex]) -> Option<usize> {
        let (index, start, end) = patterns
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.find(&self.pending).map(|m| (i, m.start(), m.end())))
            .min_by_key(|(i, start, _)| (*start, *i))?;

        self.before = self.pending[..start].to_string();
        self.pending.replace_range(..end, "");
        Some(index)
    }

    /// Move all pending output into `before` (timeout and EOF)
    pub fn take_all(&mut self) {
        self.before = std::mem::take(&mut self.pending);
    }

    pub fn before(&self) -> &str {
        &self.before
    }
}

enum ReadEvent {
    Data(Vec<u8>),
    Closed,
}

/// Runs device targets through `sh -c`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&mut self, command: &str) -> Result<Box<dyn Session>, TransportError> {
        Ok(Box::new(ProcessSession::spawn(command)?))
    }
}

/// Terminal size given to transport programs
const PTY_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 200,
    pixel_width: 0,
    pixel_height: 0,
};

/// Child process on a pseudo-terminal. Console tools (telnet, screen,
/// picocom) see a real tty; its output feeds one expect buffer.
pub struct ProcessSession {
    child: Box<dyn Child + Send + Sync>,
    writer: Option<Box<dyn Write + Send>>,
    // Kept open for the session's lifetime; dropping it hangs up the tty
    _master: Box<dyn MasterPty + Send>,
    rx: mpsc::Receiver<ReadEvent>,
    eof: bool,
    buffer: ExpectBuffer,
}

impl ProcessSession {
    pub fn spawn(command: &str) -> Result<Self, TransportError> {
        if command.trim().is_empty() {
            return Err(TransportError::EmptyCommand);
        }
        let spawn_error = |e: anyhow::Error| TransportError::Spawn {
            command: command.to_string(),
            reason: format!("{:#}", e),
        };

        let pair = native_pty_system().openpty(PTY_SIZE).map_err(spawn_error)?;
        let mut builder = CommandBuilder::new("sh");
        builder.arg("-c");
        builder.arg(command);
        let child = pair.slave.spawn_command(builder).map_err(spawn_error)?;
        // Only the child holds the slave side, so its exit reaches us as EOF
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(spawn_error)?;
        let writer = pair.master.take_writer().map_err(spawn_error)?;
        let (tx, rx) = mpsc::channel();
        spawn_reader("session-pty", reader, tx);
        tracing::debug!("Spawned session '{}' (pid {:?})", command, child.process_id());

        Ok(Self {
            child,
            writer: Some(writer),
            _master: pair.master,
            rx,
            eof: false,
            buffer: ExpectBuffer::new(),
        })
    }
}

fn spawn_reader(name: &str, mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<ReadEvent>) {
    let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut buffer = vec![0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                // EIO on the master once the child side is gone
                Ok(0) | Err(_) => {
                    let _ = tx.send(ReadEvent::Closed);
                    break;
                }
                Ok(n) => {
                    if tx.send(ReadEvent::Data(buffer[..n].to_vec())).is_err() {
                        break; // Session dropped
                    }
                }
            }
        }
    });
    if let Err(e) = spawned {
        tracing::error!("Failed to spawn session reader thread: {}", e);
    }
}

impl Session for ProcessSession {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn expect(&mut self, patterns: &[Regex], timeout: Duration) -> Expectation {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(index) = self.buffer.try_match(patterns) {
                return Expectation::Matched(index);
            }
            if self.eof {
                self.buffer.take_all();
                return Expectation::Eof;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.buffer.take_all();
                return Expectation::Timeout;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(ReadEvent::Data(bytes)) => self.buffer.push(&String::from_utf8_lossy(&bytes)),
                Ok(ReadEvent::Closed) | Err(mpsc::RecvTimeoutError::Disconnected) => self.eof = true,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    self.buffer.take_all();
                    return Expectation::Timeout;
                }
            }
        }
    }

    fn before(&self) -> &str {
        self.buffer.before()
    }

    fn close(&mut self) {
        if self.writer.take().is_none() {
            return;
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!("Session process already gone: {}", e);
        }
        let _ = self.child.wait();
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.close();
    }
}
