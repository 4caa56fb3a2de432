//! Domain model: value objects, run configuration, the session state machine
//! and failure classification.

pub mod error;
pub mod error_detector;
pub mod flake;
pub mod models;
pub mod session;
pub mod value_objects;

pub use error::{RebuildError, Result};
pub use error_detector::{describe_exit_code, ErrorDetector};
pub use flake::{FlakeRef, RebuildAction};
pub use models::{
    BuildArtifacts, ExecutionOutcome, RebuildConfig, RebuildResult, MAX_TIMEOUT_SECS,
    MIN_CAPTURE_INTERVAL_SECS, MIN_TIMEOUT_SECS,
};
pub use session::{RebuildSession, SessionState, FAILURE_EXIT_CODE};
pub use value_objects::{
    format_duration, BuildId, ErrorMessage, ErrorSource, OutputDirectory, TerminalDimensions,
    BUILD_DIR_PREFIX, CAST_FILE_NAME, GIF_FILE_NAME, LOG_FILE_NAME, METADATA_FILE_NAME,
    SCREENSHOT_FILE_NAME,
};
