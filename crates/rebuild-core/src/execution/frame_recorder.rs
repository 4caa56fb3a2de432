//! Periodic, cancellable screen capture.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::terminal::{SessionError, TerminalSession};

/// Upper bound on frames kept for one run.
pub const DEFAULT_MAX_FRAMES: usize = 2000;

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameRecorder;

impl FrameRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Capture a frame every `interval` until `max_frames` are held or the
    /// cancel flag flips to `true` (or its sender is dropped).
    ///
    /// The first frame is captured immediately. Cancellation is the normal
    /// way this ends; whatever was captured is returned. A capture already in
    /// flight is allowed to finish before the loop observes cancellation.
    pub async fn record(
        &self,
        session: Arc<dyn TerminalSession>,
        interval: Duration,
        max_frames: usize,
        mut cancel: watch::Receiver<bool>,
    ) -> Vec<String> {
        let mut frames = Vec::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while frames.len() < max_frames {
            if *cancel.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match session.capture_frame().await {
                Ok(frame) => frames.push(frame),
                Err(SessionError::Closed) => break,
                Err(e) => warn!(error = %e, "frame capture failed"),
            }
        }

        debug!(frames = frames.len(), "frame recording stopped");
        frames
    }
}
