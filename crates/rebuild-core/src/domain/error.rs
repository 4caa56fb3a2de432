//! Domain-level error taxonomy for the rebuild tester.

use std::path::PathBuf;

use super::session::SessionState;

/// Rebuild tester domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid flake reference {flake_ref:?}: {reason}")]
    InvalidFlakeRef { flake_ref: String, reason: String },

    #[error("invalid error message: {0}")]
    InvalidErrorMessage(String),

    #[error("cannot {action} session in state {from}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    #[error("output directory must be an absolute path: {0}")]
    RelativeOutputDirectory(PathBuf),

    #[error("log file must exist: {0}")]
    MissingLogFile(PathBuf),

    #[error("failed to create directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: Box<RebuildError>,
    },

    #[error("{kind} export failed: {reason}")]
    ExportFailed { kind: String, reason: String },

    #[error("build not found: {0}")]
    BuildNotFound(String),

    #[error("corrupted metadata at {path}: {reason}")]
    CorruptedMetadata { path: PathBuf, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rebuild domain operations.
pub type Result<T> = std::result::Result<T, RebuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = RebuildError::InvalidTransition {
            from: SessionState::Completed,
            action: "start",
        };
        assert_eq!(err.to_string(), "cannot start session in state completed");
    }

    #[test]
    fn test_directory_creation_failed_keeps_cause() {
        let cause = RebuildError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        ));
        let err = RebuildError::DirectoryCreationFailed {
            path: PathBuf::from("/logs/rebuild-20250101-120000"),
            source: Box::new(cause),
        };
        let msg = err.to_string();
        assert!(msg.contains("/logs/rebuild-20250101-120000"));
        assert!(msg.contains("read-only filesystem"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_export_failed_display() {
        let err = RebuildError::ExportFailed {
            kind: "gif".to_string(),
            reason: "no frames".to_string(),
        };
        assert!(err.to_string().contains("gif export failed"));
    }
}
