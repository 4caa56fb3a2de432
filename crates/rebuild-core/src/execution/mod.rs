//! Rebuild execution: command runner, frame recorder, session lifecycle and
//! the executor that coordinates them.

pub mod command_runner;
pub mod error;
pub mod executor;
pub mod frame_recorder;
pub mod session_manager;

pub use command_runner::{CommandRunner, EXIT_MARKER_PREFIX, MISSING_MARKER_EXIT_CODE};
pub use error::ExecutionError;
pub use executor::RebuildExecutor;
pub use frame_recorder::{FrameRecorder, DEFAULT_MAX_FRAMES};
pub use session_manager::SessionManager;
