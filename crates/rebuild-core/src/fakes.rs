//! In-memory fakes for the terminal and repository traits (testing only)
//!
//! Provides `ScriptedSession`, `ScriptedBackend` and `MemoryBuildRepository`
//! that satisfy the trait contracts without a real pseudo-terminal or disk.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use regex::Regex;

use crate::domain::{BuildArtifacts, BuildId, RebuildAction, RebuildError, RebuildResult, Result};
use crate::execution::EXIT_MARKER_PREFIX;
use crate::storage::BuildRepository;
use crate::terminal::{SessionError, SessionResult, TerminalBackend, TerminalSession};

// ---------------------------------------------------------------------------
// ScriptedSession
// ---------------------------------------------------------------------------

/// How [`ScriptedSession::wait_for_pattern`] behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitBehavior {
    /// Report whether the pattern matches the current screen.
    #[default]
    Match,
    /// Return `false` immediately.
    Timeout,
    /// Never return.
    Hang,
}

/// Terminal session that "runs" any command instantly.
///
/// When a command carrying an exit marker is sent and an exit code is
/// scripted, the screen becomes the echoed command, the scripted output and
/// the marker line with that code.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    output: String,
    exit_code: Option<i32>,
    wait: WaitBehavior,
    fail_send: bool,
    fail_destroy: bool,
    screen: Mutex<String>,
    sent: Mutex<Vec<String>>,
    captures: AtomicUsize,
    destroys: AtomicUsize,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self.screen = Mutex::new(output.to_string());
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_wait(mut self, wait: WaitBehavior) -> Self {
        self.wait = wait;
        self
    }

    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    fn is_destroyed(&self) -> bool {
        self.destroy_count() > 0
    }
}

fn find_marker(text: &str) -> Option<&str> {
    let start = text.find(EXIT_MARKER_PREFIX)?;
    let rest = &text[start..];
    let end = EXIT_MARKER_PREFIX.len()
        + rest[EXIT_MARKER_PREFIX.len()..]
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(rest.len() - EXIT_MARKER_PREFIX.len());
    Some(&rest[..end])
}

#[async_trait]
impl TerminalSession for ScriptedSession {
    async fn send_command(&self, text: &str) -> SessionResult<()> {
        if self.is_destroyed() {
            return Err(SessionError::Closed);
        }
        if self.fail_send {
            return Err(SessionError::Backend("scripted send failure".to_string()));
        }
        self.sent.lock().unwrap().push(text.to_string());

        let mut screen = format!("$ {}\n{}", text, self.output);
        if let (Some(marker), Some(code)) = (find_marker(text), self.exit_code) {
            screen.push_str(&format!("\n{}{}\n$ ", marker, code));
        }
        *self.screen.lock().unwrap() = screen;
        Ok(())
    }

    async fn capture_frame(&self) -> SessionResult<String> {
        if self.is_destroyed() {
            return Err(SessionError::Closed);
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.screen.lock().unwrap().clone())
    }

    async fn wait_for_pattern(&self, pattern: &Regex, _timeout: Duration) -> SessionResult<bool> {
        match self.wait {
            WaitBehavior::Match => {
                let screen = self.screen.lock().unwrap().clone();
                Ok(pattern.is_match(&screen))
            }
            WaitBehavior::Timeout => Ok(false),
            WaitBehavior::Hang => std::future::pending().await,
        }
    }

    async fn destroy(&self) -> SessionResult<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy {
            return Err(SessionError::Backend("scripted destroy failure".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Backend handing out one shared [`ScriptedSession`], or failing.
#[derive(Debug)]
pub struct ScriptedBackend {
    session: Option<Arc<ScriptedSession>>,
    error: Option<String>,
    creates: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(session: Arc<ScriptedSession>) -> Self {
        Self {
            session: Some(session),
            error: None,
            creates: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            session: None,
            error: Some(message.to_string()),
            creates: AtomicUsize::new(0),
        }
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminalBackend for ScriptedBackend {
    async fn create_session(
        &self,
        _dimensions: crate::domain::TerminalDimensions,
    ) -> SessionResult<Arc<dyn TerminalSession>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        match (&self.session, &self.error) {
            (Some(session), _) => Ok(Arc::clone(session) as Arc<dyn TerminalSession>),
            (None, Some(message)) => Err(SessionError::Spawn(message.clone())),
            (None, None) => Err(SessionError::Spawn("no scripted session".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryBuildRepository
// ---------------------------------------------------------------------------

/// In-memory build repository ordered by result timestamp.
#[derive(Debug, Default)]
pub struct MemoryBuildRepository {
    results: Mutex<Vec<RebuildResult>>,
    failing_deletes: HashSet<BuildId>,
}

impl MemoryBuildRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Vec<RebuildResult>) -> Self {
        Self {
            results: Mutex::new(results),
            failing_deletes: HashSet::new(),
        }
    }

    /// Make `delete` fail for `build_id`.
    pub fn failing_delete(mut self, build_id: BuildId) -> Self {
        self.failing_deletes.insert(build_id);
        self
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BuildRepository for MemoryBuildRepository {
    async fn save(&self, result: &RebuildResult) -> Result<()> {
        let mut results = self.results.lock().unwrap();
        results.retain(|r| r.build_id != result.build_id);
        results.push(result.clone());
        Ok(())
    }

    async fn find_by_id(&self, build_id: &BuildId) -> Result<Option<RebuildResult>> {
        let results = self.results.lock().unwrap();
        Ok(results.iter().find(|r| &r.build_id == build_id).cloned())
    }

    async fn find_recent(&self, limit: Option<usize>) -> Result<Vec<RebuildResult>> {
        let mut results = self.results.lock().unwrap().clone();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(limit.unwrap_or(usize::MAX));
        Ok(results)
    }

    async fn delete(&self, build_id: &BuildId) -> Result<()> {
        if self.failing_deletes.contains(build_id) {
            return Err(RebuildError::Storage(format!(
                "scripted delete failure for {}",
                build_id
            )));
        }
        let mut results = self.results.lock().unwrap();
        let before = results.len();
        results.retain(|r| &r.build_id != build_id);
        if results.len() == before {
            return Err(RebuildError::BuildNotFound(build_id.dir_name()));
        }
        Ok(())
    }
}

/// A plausible finished build at `timestamp`, for history fixtures.
pub fn sample_result(timestamp: DateTime<Local>, success: bool) -> RebuildResult {
    let build_id = BuildId::new(timestamp, 0);
    let output_dir = PathBuf::from("/var/lib/rebuild-tester").join(build_id.dir_name());
    RebuildResult {
        artifacts: BuildArtifacts::log_only(output_dir.join("rebuild.log")),
        build_id,
        success,
        exit_code: if success { 0 } else { 1 },
        timestamp,
        duration_seconds: 95.0,
        action: RebuildAction::Test,
        output_dir,
        error_message: (!success).then(|| "Build failed with general error".to_string()),
    }
}
