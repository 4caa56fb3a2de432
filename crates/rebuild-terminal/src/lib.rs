//! Pseudo-terminal backend for the rebuild tester.
//!
//! [`PtyBackend`] spawns an interactive shell inside a `portable-pty`
//! pseudo-terminal. A blocking reader feeds every byte the shell writes into
//! a `vt100` screen model (what [`capture_frame`] returns) and an
//! append-only transcript (what [`wait_for_pattern`] scans).
//!
//! [`capture_frame`]: rebuild_core::TerminalSession::capture_frame
//! [`wait_for_pattern`]: rebuild_core::TerminalSession::wait_for_pattern

mod decode;
mod session;

pub use session::{PtyBackend, PtySession, DEFAULT_SHELL};
