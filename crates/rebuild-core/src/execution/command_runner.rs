//! Runs the rebuild command in a terminal session and recovers its exit code.
//!
//! A terminal stream has no structured "process finished" signal, so the
//! command is sent with a trailer that prints a unique marker followed by
//! `$?`:
//!
//! ```text
//! sudo nixos-rebuild test --flake .#; printf '\n__nrt_exit_code__<hex>%s\n' $?
//! ```
//!
//! The echoed command line shows the marker followed by `%s`, never by
//! digits, so only the real trailer output matches `<marker>(\d+)`.

use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ExecutionError;
use crate::domain::{ErrorDetector, ExecutionOutcome, RebuildConfig};
use crate::terminal::TerminalSession;

/// Prefix of every exit marker.
pub const EXIT_MARKER_PREFIX: &str = "__nrt_exit_code__";

/// Exit code assumed when the wait succeeded but no frame shows the marker.
pub const MISSING_MARKER_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    detector: ErrorDetector,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh marker token, unique per invocation.
    pub fn generate_marker() -> String {
        format!("{}{}", EXIT_MARKER_PREFIX, Uuid::new_v4().simple())
    }

    /// `command` followed by the shell trailer that echoes `marker` and `$?`.
    pub fn marked_command(command: &str, marker: &str) -> String {
        format!("{}; printf '\\n{}%s\\n' $?", command, marker)
    }

    /// `<marker>(?P<exit_code>\d+)` with the marker escaped.
    pub fn marker_pattern(marker: &str) -> Result<Regex, ExecutionError> {
        Ok(Regex::new(&format!(
            r"{}(?P<exit_code>\d+)",
            regex::escape(marker)
        ))?)
    }

    /// Exit code from the most recent frame containing the marker, or
    /// [`MISSING_MARKER_EXIT_CODE`] when none does.
    pub fn extract_exit_code(frames: &[String], pattern: &Regex) -> i32 {
        frames
            .iter()
            .rev()
            .find_map(|frame| {
                pattern
                    .captures_iter(frame)
                    .last()
                    .and_then(|caps| caps.name("exit_code"))
                    .and_then(|m| m.as_str().parse::<i32>().ok())
            })
            .unwrap_or_else(|| {
                warn!("exit marker matched but not found in captured frames");
                MISSING_MARKER_EXIT_CODE
            })
    }

    /// Send the marked command and wait for it to finish.
    ///
    /// The returned outcome holds one frame: the screen captured right after
    /// the marker was seen.
    pub async fn run(
        &self,
        session: &dyn TerminalSession,
        config: &RebuildConfig,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let started = Instant::now();
        let marker = Self::generate_marker();
        let pattern = Self::marker_pattern(&marker)?;
        let command_line = config.command_line();

        info!(command = %command_line, "sending rebuild command");
        session
            .send_command(&Self::marked_command(&command_line, &marker))
            .await?;

        let timeout = config.timeout();
        if !self.wait_for_marker(session, &pattern, timeout).await? {
            let frames: Vec<String> = session.capture_frame().await.ok().into_iter().collect();
            warn!(timeout_secs = timeout.as_secs(), "rebuild did not finish in time");
            return Err(ExecutionError::Timeout { timeout, frames });
        }

        let frames = vec![session.capture_frame().await?];
        let exit_code = Self::extract_exit_code(&frames, &pattern);
        let error = self
            .detector
            .extract_best_error(exit_code, Some(&frames), None);
        let duration = started.elapsed();

        debug!(exit_code, duration_ms = duration.as_millis() as u64, "command finished");
        Ok(ExecutionOutcome {
            exit_code,
            duration,
            frames,
            error,
        })
    }

    async fn wait_for_marker(
        &self,
        session: &dyn TerminalSession,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<bool, ExecutionError> {
        match tokio::time::timeout(timeout, session.wait_for_pattern(pattern, timeout)).await {
            Ok(matched) => Ok(matched?),
            Err(_elapsed) => Ok(false),
        }
    }
}
