use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use regex::Regex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use rebuild_core::{
    SessionError, SessionResult, TerminalBackend, TerminalDimensions, TerminalSession,
};

use crate::decode::Utf8Decoder;

pub const DEFAULT_SHELL: &str = "/bin/sh";

const DEFAULT_TERM: &str = "xterm-256color";
const READ_BUFFER_SIZE: usize = 8192;
const SCROLLBACK_LINES: usize = 1000;

/// Upper bound between transcript rescans when no output notification
/// arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bytes of already-scanned transcript rescanned with new output, so a match
/// straddling two reads is still found.
const SCAN_OVERLAP: usize = 512;

/// Transcript size at which the reader drops the oldest half even when
/// nobody is waiting on it.
const MAX_TRANSCRIPT_BYTES: usize = 1 << 20;

struct ScreenState {
    parser: vt100::Parser,
    /// Output not yet consumed by [`PtySession::wait_for_pattern`]. Scanned
    /// text is dropped down to a `SCAN_OVERLAP` tail.
    transcript: String,
    /// Reader hit EOF or an error; no more output will arrive.
    eof: bool,
}

/// A shell running in a pseudo-terminal.
pub struct PtySession {
    state: Arc<Mutex<ScreenState>>,
    output: Arc<Notify>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    destroyed: AtomicBool,
}

impl PtySession {
    fn spawn(
        shell: &str,
        cwd: Option<&PathBuf>,
        dimensions: TerminalDimensions,
    ) -> SessionResult<Self> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: dimensions.height(),
                cols: dimensions.width(),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.env("TERM", DEFAULT_TERM);
        cmd.env("PS1", "$ ");
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::Spawn(e.to_string()))?;
        let killer = child.clone_killer();
        // the child holds its own handle to the slave side
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::Spawn(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let state = Arc::new(Mutex::new(ScreenState {
            parser: vt100::Parser::new(dimensions.height(), dimensions.width(), SCROLLBACK_LINES),
            transcript: String::new(),
            eof: false,
        }));
        let output = Arc::new(Notify::new());

        // both live until the shell exits; kept off tokio's blocking pool
        std::thread::Builder::new()
            .name("pty-reader".to_string())
            .spawn({
                let state = Arc::clone(&state);
                let output = Arc::clone(&output);
                move || pump_output(reader, state, output)
            })?;
        std::thread::Builder::new()
            .name("pty-child".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => debug!(exit_code = status.exit_code(), "shell exited"),
                Err(e) => warn!(error = %e, "failed to wait for shell"),
            })?;

        Ok(Self {
            state,
            output,
            writer: Arc::new(Mutex::new(writer)),
            killer: Mutex::new(killer),
            master: Mutex::new(Some(pair.master)),
            destroyed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn lock_state(&self) -> SessionResult<MutexGuard<'_, ScreenState>> {
        self.state
            .lock()
            .map_err(|_| SessionError::Backend("terminal state lock poisoned".to_string()))
    }

    /// Shell output not yet consumed by a pattern wait, escape sequences
    /// included.
    pub fn transcript(&self) -> SessionResult<String> {
        Ok(self.lock_state()?.transcript.clone())
    }
}

/// Reader loop: runs on a blocking thread until the PTY closes.
fn pump_output(
    mut reader: Box<dyn Read + Send>,
    state: Arc<Mutex<ScreenState>>,
    output: Arc<Notify>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                match state.lock() {
                    Ok(mut s) => {
                        s.parser.process(&buf[..n]);
                        s.transcript.push_str(&text);
                        cap_transcript(&mut s.transcript);
                    }
                    Err(_) => break,
                }
                output.notify_one();
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "pty read ended");
                break;
            }
        }
    }
    if let Ok(mut s) = state.lock() {
        s.eof = true;
    }
    output.notify_one();
}

/// Largest char boundary of `text` at or below `idx`.
fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Drop everything but the last `SCAN_OVERLAP` bytes.
fn retain_overlap(transcript: &mut String) {
    let keep_from =
        floor_char_boundary(transcript, transcript.len().saturating_sub(SCAN_OVERLAP));
    transcript.drain(..keep_from);
}

fn cap_transcript(transcript: &mut String) {
    if transcript.len() > MAX_TRANSCRIPT_BYTES {
        let keep_from = floor_char_boundary(transcript, transcript.len() / 2);
        transcript.drain(..keep_from);
    }
}

#[async_trait]
impl TerminalSession for PtySession {
    async fn send_command(&self, text: &str) -> SessionResult<()> {
        self.ensure_open()?;
        let writer = Arc::clone(&self.writer);
        let line = format!("{}\r", text);
        tokio::task::spawn_blocking(move || -> SessionResult<()> {
            let mut w = writer
                .lock()
                .map_err(|_| SessionError::Backend("terminal writer lock poisoned".to_string()))?;
            w.write_all(line.as_bytes())?;
            w.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| SessionError::Backend(e.to_string()))?
    }

    async fn capture_frame(&self) -> SessionResult<String> {
        self.ensure_open()?;
        Ok(self.lock_state()?.parser.screen().contents())
    }

    async fn wait_for_pattern(&self, pattern: &Regex, timeout: Duration) -> SessionResult<bool> {
        // None: too far out to represent, wait without a deadline
        let deadline = Instant::now().checked_add(timeout);
        loop {
            self.ensure_open()?;
            {
                let mut state = self.lock_state()?;
                if pattern.is_match(&state.transcript) {
                    return Ok(true);
                }
                if state.eof {
                    return Ok(false);
                }
                retain_overlap(&mut state.transcript);
            }

            let wake = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            let _ = tokio::time::timeout(wake, self.output.notified()).await;
        }
    }

    async fn destroy(&self) -> SessionResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.killer.lock() {
            Ok(mut killer) => {
                if let Err(e) = killer.kill() {
                    debug!(error = %e, "shell already gone");
                }
            }
            Err(_) => warn!("terminal killer lock poisoned"),
        }
        if let Ok(mut master) = self.master.lock() {
            master.take();
        }
        info!("terminal session destroyed");
        Ok(())
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if !self.destroyed.load(Ordering::SeqCst) {
            if let Ok(mut killer) = self.killer.lock() {
                let _ = killer.kill();
            }
        }
    }
}

/// Spawns [`PtySession`]s running a shell.
#[derive(Debug, Clone)]
pub struct PtyBackend {
    shell: String,
    cwd: Option<PathBuf>,
}

impl Default for PtyBackend {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            cwd: None,
        }
    }
}

impl PtyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Working directory of the shell; relative flake references such as
    /// `.#` resolve against it.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[async_trait]
impl TerminalBackend for PtyBackend {
    async fn create_session(
        &self,
        dimensions: TerminalDimensions,
    ) -> SessionResult<Arc<dyn TerminalSession>> {
        let shell = self.shell.clone();
        let cwd = match &self.cwd {
            Some(dir) => Some(dir.clone()),
            None => std::env::current_dir().ok(),
        };
        info!(
            shell = %shell,
            cols = dimensions.width(),
            rows = dimensions.height(),
            "spawning pty"
        );

        let session = tokio::task::spawn_blocking(move || {
            PtySession::spawn(&shell, cwd.as_ref(), dimensions)
        })
        .await
        .map_err(|e| SessionError::Spawn(e.to_string()))??;
        Ok(Arc::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_char_boundary() {
        let text = "aé";
        assert_eq!(floor_char_boundary(text, 0), 0);
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(floor_char_boundary(text, 3), 3);
        assert_eq!(floor_char_boundary(text, 99), 3);
    }

    #[test]
    fn test_retain_overlap_keeps_tail() {
        let mut transcript = "x".repeat(10 * SCAN_OVERLAP);
        transcript.push_str("__tail__");
        retain_overlap(&mut transcript);
        assert_eq!(transcript.len(), SCAN_OVERLAP);
        assert!(transcript.ends_with("__tail__"));

        let mut short = "short".to_string();
        retain_overlap(&mut short);
        assert_eq!(short, "short");
    }

    #[test]
    fn test_retain_overlap_respects_char_boundaries() {
        let mut transcript = "é".repeat(SCAN_OVERLAP);
        retain_overlap(&mut transcript);
        assert!(transcript.len() <= SCAN_OVERLAP + 1);
        assert!(transcript.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_cap_transcript_bounds_growth() {
        let mut transcript = "y".repeat(MAX_TRANSCRIPT_BYTES + 10);
        cap_transcript(&mut transcript);
        assert!(transcript.len() <= MAX_TRANSCRIPT_BYTES / 2 + 10);

        let mut small = "small".to_string();
        cap_transcript(&mut small);
        assert_eq!(small, "small");
    }
}
