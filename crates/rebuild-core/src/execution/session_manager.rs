use std::sync::Arc;

use tracing::{debug, info};

use super::error::ExecutionError;
use crate::domain::{RebuildConfig, TerminalDimensions};
use crate::obs::emit_session_cleanup_failed;
use crate::terminal::{TerminalBackend, TerminalSession};

/// Acquires and releases terminal sessions for rebuild runs.
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn TerminalBackend>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn TerminalBackend>) -> Self {
        Self { backend }
    }

    pub async fn create_for_rebuild(
        &self,
        config: &RebuildConfig,
        dimensions: TerminalDimensions,
    ) -> Result<Arc<dyn TerminalSession>, ExecutionError> {
        info!(
            action = %config.action,
            width = dimensions.width(),
            height = dimensions.height(),
            "creating terminal session"
        );
        self.backend
            .create_session(dimensions)
            .await
            .map_err(ExecutionError::SessionCreationFailed)
    }

    /// Destroy `session`. Failures are logged and swallowed.
    pub async fn cleanup(&self, session: &dyn TerminalSession) {
        match session.destroy().await {
            Ok(()) => debug!("terminal session destroyed"),
            Err(e) => emit_session_cleanup_failed(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedBackend, ScriptedSession};

    #[tokio::test]
    async fn test_create_failure_is_classified() {
        let manager = SessionManager::new(Arc::new(ScriptedBackend::failing("no pty")));
        let err = manager
            .create_for_rebuild(&RebuildConfig::default(), TerminalDimensions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ExecutionError::SessionCreationFailed(_)));
        assert!(err.to_string().contains("no pty"));
    }

    #[tokio::test]
    async fn test_cleanup_swallows_errors() {
        let session = Arc::new(ScriptedSession::new().failing_destroy());
        let manager = SessionManager::new(Arc::new(ScriptedBackend::new(session.clone())));
        manager.cleanup(session.as_ref()).await;
        assert_eq!(session.destroy_count(), 1);
    }
}
