//! Orchestrates one rebuild execution: the command runner and the frame
//! recorder race against the same terminal session, and the recorder is
//! always cancelled and awaited once the runner returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::command_runner::CommandRunner;
use super::error::ExecutionError;
use super::frame_recorder::FrameRecorder;
use super::session_manager::SessionManager;
use crate::domain::{ExecutionOutcome, RebuildConfig, TerminalDimensions};
use crate::terminal::TerminalSession;

#[derive(Clone)]
pub struct RebuildExecutor {
    sessions: SessionManager,
    runner: CommandRunner,
    recorder: FrameRecorder,
}

impl RebuildExecutor {
    pub fn new(sessions: SessionManager, runner: CommandRunner, recorder: FrameRecorder) -> Self {
        Self {
            sessions,
            runner,
            recorder,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run the rebuild once.
    ///
    /// On success the session is still open and is handed to the caller,
    /// who must release it through [`SessionManager::cleanup`] after export.
    /// On any error the session has already been released. Outcome frames
    /// are the recorder's frames followed by the runner's closing frame.
    pub async fn execute(
        &self,
        config: &RebuildConfig,
        dimensions: TerminalDimensions,
        capture_interval: Duration,
        max_frames: usize,
    ) -> Result<(ExecutionOutcome, Arc<dyn TerminalSession>), ExecutionError> {
        let session = self.sessions.create_for_rebuild(config, dimensions).await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let recording = tokio::spawn({
            let recorder = self.recorder;
            let session = Arc::clone(&session);
            async move {
                recorder
                    .record(session, capture_interval, max_frames, cancel_rx)
                    .await
            }
        });

        let result = self.runner.run(session.as_ref(), config).await;

        let _ = cancel_tx.send(true);
        let recorded = match recording.await {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "frame recorder task failed");
                Vec::new()
            }
        };

        match result {
            Ok(mut outcome) => {
                let mut frames = recorded;
                frames.append(&mut outcome.frames);
                outcome.frames = frames;
                info!(
                    exit_code = outcome.exit_code,
                    frames = outcome.frames.len(),
                    "execution finished"
                );
                Ok((outcome, session))
            }
            Err(ExecutionError::Timeout { timeout, frames }) => {
                self.sessions.cleanup(session.as_ref()).await;
                let mut all = recorded;
                all.extend(frames);
                Err(ExecutionError::Timeout {
                    timeout,
                    frames: all,
                })
            }
            Err(e) => {
                warn!(error = %e, "execution failed");
                self.sessions.cleanup(session.as_ref()).await;
                Err(e)
            }
        }
    }
}
