//! Structured observability hooks for the rebuild lifecycle.
//!
//! - Build-scoped tracing spans via [`BuildSpan`]
//! - Emission functions for key lifecycle events: start, finish, export,
//!   retention pruning and best-effort cleanup failures
//!
//! Events are emitted at `info!` level (warnings for swallowed failures) and
//! can be filtered through `RUST_LOG`.

use tracing::{info, warn};

/// Build-scoped tracing span tagged with the build id.
///
/// ```ignore
/// let span = BuildSpan::new("rebuild-20250101-120000");
/// run(build_id).instrument(span.into_span()).await;
/// // every event logged inside carries build_id = "rebuild-20250101-120000"
/// ```
pub struct BuildSpan {
    span: tracing::Span,
}

impl BuildSpan {
    pub fn new(build_id: &str) -> Self {
        Self {
            span: tracing::info_span!("rebuild.build", build_id = %build_id),
        }
    }

    /// Enter the span for synchronous work.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// The span itself, for `Instrument::instrument` on async work.
    pub fn into_span(self) -> tracing::Span {
        self.span
    }
}

/// Emit event: build started for an action and flake reference.
pub fn emit_build_started(build_id: &str, action: &str, flake_ref: &str) {
    info!(
        event = "build.started",
        build_id = %build_id,
        action = %action,
        flake_ref = %flake_ref,
    );
}

/// Emit event: build reached a terminal state.
pub fn emit_build_finished(build_id: &str, exit_code: i32, duration_ms: u64, success: bool) {
    info!(
        event = "build.finished",
        build_id = %build_id,
        exit_code = exit_code,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: export pipeline finished.
pub fn emit_export_finished(build_id: &str, requested: usize, produced: usize) {
    info!(
        event = "export.finished",
        build_id = %build_id,
        requested = requested,
        produced = produced,
    );
}

/// Emit event: retention pass removed old builds.
pub fn emit_retention_pruned(selected: usize, deleted: usize) {
    info!(event = "retention.pruned", selected = selected, deleted = deleted);
}

/// Emit event: terminal session teardown failed (warning level).
pub fn emit_session_cleanup_failed(error: &dyn std::fmt::Display) {
    warn!(event = "session.cleanup_failed", error = %error);
}
