//! The single-use rebuild session state machine.
//!
//! ```text
//! Created --start--> Running --complete--> Completed | Failed
//!                            --fail------> Failed
//! ```
//!
//! There is no way out of `Completed` or `Failed`.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{RebuildError, Result};
use super::models::{BuildArtifacts, ExecutionOutcome, RebuildConfig, RebuildResult};
use super::value_objects::{BuildId, ErrorMessage, OutputDirectory};
use crate::storage::FileSystem;

/// Exit code recorded for runs that failed outside the rebuild itself.
pub const FAILURE_EXIT_CODE: i32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Running,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One rebuild run. Owned by the caller for the lifetime of the run; only the
/// [`RebuildResult`] it produces outlives it.
#[derive(Debug)]
pub struct RebuildSession {
    session_id: BuildId,
    config: RebuildConfig,
    started_at: DateTime<Local>,
    state: SessionState,
}

impl RebuildSession {
    pub fn create(config: RebuildConfig) -> Self {
        Self::with_id(BuildId::generate(), config)
    }

    pub fn with_id(session_id: BuildId, config: RebuildConfig) -> Self {
        Self {
            started_at: session_id.timestamp(),
            session_id,
            config,
            state: SessionState::Created,
        }
    }

    pub fn session_id(&self) -> &BuildId {
        &self.session_id
    }

    pub fn config(&self) -> &RebuildConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state(SessionState::Created, "start")?;
        self.state = SessionState::Running;
        debug!(build_id = %self.session_id, "session running");
        Ok(())
    }

    /// Finish the run from an execution outcome.
    ///
    /// Creates an empty log if none was exported, then records whichever
    /// optional artifacts exist under `output_dir`.
    pub async fn complete(
        &mut self,
        outcome: &ExecutionOutcome,
        output_dir: &OutputDirectory,
        fs: &dyn FileSystem,
    ) -> Result<RebuildResult> {
        self.expect_state(SessionState::Running, "complete")?;

        let log_file = ensure_log(fs, output_dir).await?;
        let artifacts = BuildArtifacts::new(
            log_file,
            existing(fs, output_dir.cast_file()).await,
            existing(fs, output_dir.screenshot_file()).await,
            existing(fs, output_dir.gif_file()).await,
        )?;

        self.state = if outcome.is_success() {
            SessionState::Completed
        } else {
            SessionState::Failed
        };

        Ok(RebuildResult {
            build_id: self.session_id.clone(),
            success: outcome.is_success(),
            exit_code: outcome.exit_code,
            timestamp: self.started_at,
            duration_seconds: outcome.duration.as_secs_f64(),
            action: self.config.action,
            output_dir: output_dir.path().to_path_buf(),
            artifacts,
            error_message: outcome.error.as_ref().map(|e| e.content().to_string()),
        })
    }

    /// Force the run into `Failed` with exit code 255 and log-only artifacts.
    pub async fn fail(
        &mut self,
        error: &ErrorMessage,
        output_dir: &OutputDirectory,
        fs: &dyn FileSystem,
    ) -> Result<RebuildResult> {
        self.expect_state(SessionState::Running, "fail")?;
        self.state = SessionState::Failed;
        Ok(self.failure_result(error, output_dir, fs).await)
    }

    /// Failure record for `error`, without a state check.
    ///
    /// The build directory and log are created when missing. If the
    /// filesystem refuses both, the recorded log path does not exist.
    pub(crate) async fn failure_result(
        &self,
        error: &ErrorMessage,
        output_dir: &OutputDirectory,
        fs: &dyn FileSystem,
    ) -> RebuildResult {
        let log_file = match ensure_log(fs, output_dir).await {
            Ok(path) => path,
            Err(e) => {
                warn!(path = %output_dir.path().display(), error = %e, "could not create log file");
                output_dir.log_file()
            }
        };
        RebuildResult {
            build_id: self.session_id.clone(),
            success: false,
            exit_code: FAILURE_EXIT_CODE,
            timestamp: self.started_at,
            duration_seconds: 0.0,
            action: self.config.action,
            output_dir: output_dir.path().to_path_buf(),
            artifacts: BuildArtifacts::log_only(log_file),
            error_message: Some(error.content().to_string()),
        }
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(RebuildError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        Ok(())
    }
}

/// Path of the build log, created empty (with its directory) if missing.
async fn ensure_log(fs: &dyn FileSystem, output_dir: &OutputDirectory) -> Result<PathBuf> {
    let log_file = output_dir.log_file();
    if fs.exists(&log_file).await {
        return Ok(log_file);
    }
    if !fs.is_dir(output_dir.path()).await {
        fs.create_directory(output_dir.path()).await?;
    }
    fs.write_text(&log_file, "").await?;
    Ok(log_file)
}

async fn existing(fs: &dyn FileSystem, path: PathBuf) -> Option<PathBuf> {
    fs.exists(&path).await.then_some(path)
}
