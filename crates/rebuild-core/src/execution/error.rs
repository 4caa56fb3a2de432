use std::time::Duration;

use crate::terminal::SessionError;

/// How an execution attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to create terminal session: {0}")]
    SessionCreationFailed(#[source] SessionError),

    /// The exit marker never appeared. Carries the frames captured so far.
    #[error("rebuild timed out after {}s", .timeout.as_secs())]
    Timeout {
        timeout: Duration,
        frames: Vec<String>,
    },

    #[error("terminal session error: {0}")]
    Session(#[from] SessionError),

    #[error("invalid exit marker pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout { .. })
    }
}
