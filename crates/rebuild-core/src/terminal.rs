//! Terminal collaborator traits.
//!
//! The core never emulates a terminal itself. It drives whatever backend
//! implements these traits:
//! - `TerminalSession`: one live pseudo-terminal running a shell
//! - `TerminalBackend`: factory for sessions of a given size
//!
//! Both traits are async and backend-agnostic. A scriptable in-memory
//! implementation lives in [`crate::fakes`]; the PTY implementation lives in
//! the `rebuild-terminal` crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::domain::TerminalDimensions;

/// Terminal backend failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to spawn terminal: {0}")]
    Spawn(String),

    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("terminal session already destroyed")]
    Closed,

    #[error("terminal backend error: {0}")]
    Backend(String),
}

/// Result type for terminal operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// A live terminal session.
///
/// Methods take `&self` so the session can be shared between the frame
/// recorder and the command runner; implementations serialize their own I/O.
#[async_trait]
pub trait TerminalSession: Send + Sync {
    /// Type `text` followed by Enter.
    async fn send_command(&self, text: &str) -> SessionResult<()>;

    /// Current visible screen contents.
    async fn capture_frame(&self) -> SessionResult<String>;

    /// Block until `pattern` appears in the session output or `timeout`
    /// elapses. Returns `false` on timeout.
    async fn wait_for_pattern(&self, pattern: &Regex, timeout: Duration) -> SessionResult<bool>;

    /// Tear the session down. Calling it again is a no-op.
    async fn destroy(&self) -> SessionResult<()>;
}

/// Factory for terminal sessions.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    async fn create_session(
        &self,
        dimensions: TerminalDimensions,
    ) -> SessionResult<Arc<dyn TerminalSession>>;
}
