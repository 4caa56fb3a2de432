//! Exercises a real `/bin/sh` inside a pseudo-terminal.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use rebuild_core::{CommandRunner, SessionError, TerminalBackend, TerminalDimensions, TerminalSession};
use rebuild_terminal::PtyBackend;

const WAIT: Duration = Duration::from_secs(10);

async fn shell() -> Arc<dyn TerminalSession> {
    let dims = TerminalDimensions::new(80, 24).expect("dims");
    PtyBackend::new()
        .create_session(dims)
        .await
        .expect("spawn shell")
}

async fn run_marked(session: &dyn TerminalSession, command: &str) -> i32 {
    let marker = CommandRunner::generate_marker();
    let pattern = CommandRunner::marker_pattern(&marker).expect("pattern");
    session
        .send_command(&CommandRunner::marked_command(command, &marker))
        .await
        .expect("send");
    assert!(
        session.wait_for_pattern(&pattern, WAIT).await.expect("wait"),
        "marker never appeared for {command}"
    );
    let frame = session.capture_frame().await.expect("capture");
    CommandRunner::extract_exit_code(&[frame], &pattern)
}

#[tokio::test]
async fn output_becomes_visible_on_screen() {
    let session = shell().await;
    session
        .send_command("printf 'hello-%s\\n' pty")
        .await
        .expect("send");

    let pattern = Regex::new(r"hello-pty").expect("regex");
    assert!(session.wait_for_pattern(&pattern, WAIT).await.expect("wait"));

    let frame = session.capture_frame().await.expect("capture");
    assert!(frame.contains("hello-pty"), "screen was: {frame}");
    session.destroy().await.expect("destroy");
}

#[tokio::test]
async fn exit_marker_reports_command_status() {
    let session = shell().await;
    assert_eq!(run_marked(session.as_ref(), "true").await, 0);
    assert_eq!(run_marked(session.as_ref(), "(exit 42)").await, 42);
    assert_eq!(run_marked(session.as_ref(), "false").await, 1);
    session.destroy().await.expect("destroy");
}

#[tokio::test]
async fn wait_gives_up_at_deadline() {
    let session = shell().await;
    let pattern = Regex::new(r"never-printed-\d{6}").expect("regex");
    let started = std::time::Instant::now();
    let matched = session
        .wait_for_pattern(&pattern, Duration::from_millis(300))
        .await
        .expect("wait");
    assert!(!matched);
    assert!(started.elapsed() < WAIT);
    session.destroy().await.expect("destroy");
}

#[tokio::test]
async fn unbounded_timeout_still_waits_for_output() {
    let session = shell().await;
    session
        .send_command("printf 'late-%s\\n' arrival")
        .await
        .expect("send");

    let pattern = Regex::new(r"late-arrival").expect("regex");
    let matched = tokio::time::timeout(
        WAIT,
        session.wait_for_pattern(&pattern, Duration::from_secs(u64::MAX)),
    )
    .await
    .expect("wait returned before the outer guard")
    .expect("wait");
    assert!(matched);
    session.destroy().await.expect("destroy");
}

#[tokio::test]
async fn long_output_is_scanned_across_reads() {
    let session = shell().await;
    let marker = CommandRunner::generate_marker();
    let pattern = CommandRunner::marker_pattern(&marker).expect("pattern");
    session
        .send_command(&CommandRunner::marked_command(
            "i=0; while [ $i -lt 2000 ]; do echo \"building line $i\"; i=$((i+1)); done",
            &marker,
        ))
        .await
        .expect("send");

    assert!(session.wait_for_pattern(&pattern, WAIT).await.expect("wait"));
    let frame = session.capture_frame().await.expect("capture");
    assert_eq!(CommandRunner::extract_exit_code(&[frame], &pattern), 0);
    session.destroy().await.expect("destroy");
}

#[tokio::test]
async fn destroyed_session_is_closed() {
    let session = shell().await;
    session.destroy().await.expect("first destroy");
    session.destroy().await.expect("second destroy is a no-op");

    assert!(matches!(
        session.capture_frame().await,
        Err(SessionError::Closed)
    ));
    assert!(matches!(
        session.send_command("echo late").await,
        Err(SessionError::Closed)
    ));
}
