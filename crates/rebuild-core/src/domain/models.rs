//! Run configuration, execution outcomes and the persisted result record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::error::{RebuildError, Result};
use super::flake::{FlakeRef, RebuildAction};
use super::value_objects::{format_duration, BuildId, ErrorMessage};

/// Minimum accepted rebuild timeout.
pub const MIN_TIMEOUT_SECS: u64 = 60;

/// Maximum accepted rebuild timeout (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Minimum accepted frame capture interval.
pub const MIN_CAPTURE_INTERVAL_SECS: f64 = 0.1;

/// What to rebuild and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    pub action: RebuildAction,
    pub flake_ref: FlakeRef,
    pub timeout_secs: u64,
    pub capture_interval_secs: f64,
    /// Prefix the command with `sudo`.
    pub use_sudo: bool,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            action: RebuildAction::Test,
            flake_ref: FlakeRef::default(),
            timeout_secs: 1800,
            capture_interval_secs: 5.0,
            use_sudo: true,
        }
    }
}

impl RebuildConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(RebuildError::InvalidConfig(format!(
                "timeout must be between {} and {} seconds, got {}",
                MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, self.timeout_secs
            )));
        }
        if !self.capture_interval_secs.is_finite()
            || self.capture_interval_secs < MIN_CAPTURE_INTERVAL_SECS
        {
            return Err(RebuildError::InvalidConfig(format!(
                "capture interval must be at least {} seconds, got {}",
                MIN_CAPTURE_INTERVAL_SECS, self.capture_interval_secs
            )));
        }
        if self.capture_interval_secs > self.timeout_secs as f64 {
            return Err(RebuildError::InvalidConfig(format!(
                "capture interval {}s exceeds the {}s timeout",
                self.capture_interval_secs, self.timeout_secs
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Capture interval clamped to `[MIN_CAPTURE_INTERVAL_SECS, timeout]`, so an
    /// unvalidated config still yields a usable duration.
    pub fn capture_interval(&self) -> Duration {
        let min = Duration::from_secs_f64(MIN_CAPTURE_INTERVAL_SECS);
        Duration::try_from_secs_f64(self.capture_interval_secs)
            .unwrap_or(min)
            .clamp(min, self.timeout().max(min))
    }

    /// Shell command line for this rebuild, without the exit-marker trailer.
    pub fn command_line(&self) -> String {
        let base = format!(
            "nixos-rebuild {} --flake {}",
            self.action.as_str(),
            self.flake_ref
        );
        if self.use_sudo {
            format!("sudo {}", base)
        } else {
            base
        }
    }
}

/// What happened when the command ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub duration: Duration,
    /// Captured frames in capture order.
    pub frames: Vec<String>,
    pub error: Option<ErrorMessage>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn last_frame(&self) -> Option<&str> {
        self.frames.last().map(String::as_str)
    }
}

/// Files produced for one build. The log is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifacts {
    log_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cast_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    screenshot_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gif_file: Option<PathBuf>,
}

impl BuildArtifacts {
    /// Fails with [`RebuildError::MissingLogFile`] unless `log_file` exists.
    pub fn new(
        log_file: PathBuf,
        cast_file: Option<PathBuf>,
        screenshot_file: Option<PathBuf>,
        gif_file: Option<PathBuf>,
    ) -> Result<Self> {
        if !log_file.is_file() {
            return Err(RebuildError::MissingLogFile(log_file));
        }
        Ok(Self {
            log_file,
            cast_file,
            screenshot_file,
            gif_file,
        })
    }

    /// Log-only artifacts for the failure path, where the log may not have
    /// been written.
    pub(crate) fn log_only(log_file: PathBuf) -> Self {
        Self {
            log_file,
            cast_file: None,
            screenshot_file: None,
            gif_file: None,
        }
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn cast_file(&self) -> Option<&Path> {
        self.cast_file.as_deref()
    }

    pub fn screenshot_file(&self) -> Option<&Path> {
        self.screenshot_file.as_deref()
    }

    pub fn gif_file(&self) -> Option<&Path> {
        self.gif_file.as_deref()
    }

    pub fn all_files(&self) -> Vec<&Path> {
        let mut files = vec![self.log_file.as_path()];
        files.extend(self.cast_file());
        files.extend(self.screenshot_file());
        files.extend(self.gif_file());
        files
    }
}

/// Persisted record of one run, serialized to `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildResult {
    pub build_id: BuildId,
    pub success: bool,
    pub exit_code: i32,
    pub timestamp: DateTime<Local>,
    pub duration_seconds: f64,
    pub action: RebuildAction,
    pub output_dir: PathBuf,
    pub artifacts: BuildArtifacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RebuildResult {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds.max(0.0))
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration())
    }

    pub fn status_label(&self) -> &'static str {
        if self.success {
            "SUCCESS"
        } else {
            "FAILED"
        }
    }
}
