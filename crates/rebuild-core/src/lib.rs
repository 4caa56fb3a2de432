//! Rebuild Core Library
//!
//! Runs a `nixos-rebuild` invocation inside a captured pseudo-terminal,
//! records terminal frames while it runs, classifies the outcome and exports
//! the recording as a set of on-disk artifacts. Past runs are kept as a
//! bounded history of build directories.
//!
//! ## Layers
//!
//! - [`domain`]: value objects, the `RebuildSession` state machine and the
//!   error detector
//! - [`terminal`]: the capability set a terminal backend must provide
//! - [`execution`]: command runner, frame recorder, session manager, executor
//! - [`export`]: parallel artifact export and the concrete encoders
//! - [`storage`]: build directories, metadata repository, retention
//! - [`application`]: composition root exposing the never-failing run

pub mod application;
pub mod config;
pub mod domain;
pub mod execution;
pub mod export;
pub mod fakes;
pub mod obs;
pub mod storage;
pub mod telemetry;
pub mod terminal;

pub use application::{fallback_base_dir, RebuildApplication, RunFailure};
pub use config::{Config, OutputConfig, RecordingConfig};

pub use domain::{
    BuildArtifacts, BuildId, ErrorDetector, ErrorMessage, ErrorSource, ExecutionOutcome,
    FlakeRef, OutputDirectory, RebuildAction, RebuildConfig, RebuildError, RebuildResult,
    RebuildSession, Result, SessionState, TerminalDimensions,
};

pub use execution::{
    CommandRunner, ExecutionError, FrameRecorder, RebuildExecutor, SessionManager,
    DEFAULT_MAX_FRAMES,
};

pub use export::{ArtifactExporter, ArtifactKind, CaptureData, ExportPipeline, ExporterRegistry};

pub use storage::{
    BuildCleaner, BuildDirectoryManager, BuildRepository, FileSystem, FsBuildRepository,
    LocalFileSystem, RetentionPolicy,
};

pub use terminal::{SessionError, SessionResult, TerminalBackend, TerminalSession};

pub use obs::{
    emit_build_finished, emit_build_started, emit_export_finished, emit_retention_pruned,
    emit_session_cleanup_failed, BuildSpan,
};
pub use telemetry::init_tracing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
