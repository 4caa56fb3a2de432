//! End-to-end rebuild runs against a scripted terminal session.

use std::sync::Arc;
use std::time::Duration;

use rebuild_core::fakes::{MemoryBuildRepository, ScriptedBackend, ScriptedSession, WaitBehavior};
use rebuild_core::{
    CommandRunner, Config, ExecutionError, FrameRecorder, LocalFileSystem, RebuildAction,
    RebuildApplication, RebuildConfig, RebuildExecutor, SessionManager, TerminalDimensions,
};

fn executor_for(session: Arc<ScriptedSession>) -> RebuildExecutor {
    RebuildExecutor::new(
        SessionManager::new(Arc::new(ScriptedBackend::new(session))),
        CommandRunner::new(),
        FrameRecorder::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn immediate_wait_failure_is_timeout_with_single_cleanup() {
    let session = Arc::new(
        ScriptedSession::new()
            .with_output("building the system configuration...")
            .with_wait(WaitBehavior::Timeout),
    );

    let err = executor_for(session.clone())
        .execute(
            &RebuildConfig::default(),
            TerminalDimensions::default(),
            Duration::from_secs(5),
            2000,
        )
        .await
        .err()
        .expect("execution should time out");

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(matches!(err, ExecutionError::Timeout { .. }));
    assert_eq!(session.destroy_count(), 1, "session must be cleaned up exactly once");
}

#[tokio::test(start_paused = true)]
async fn successful_test_run_without_recording() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.recording.enabled = false;
    config.rebuild.action = RebuildAction::Test;
    config.output.base_dir = tmp.path().to_path_buf();

    let session = Arc::new(
        ScriptedSession::new()
            .with_output("activating the configuration...\nsetting up /etc...")
            .with_exit_code(0),
    );
    let app = RebuildApplication::with_components(
        config,
        Arc::new(ScriptedBackend::new(session.clone())),
        Arc::new(LocalFileSystem::new()),
        Arc::new(MemoryBuildRepository::new()),
    )
    .expect("app");

    let result = app.run_rebuild().await;

    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.action, RebuildAction::Test);
    assert!(result.error_message.is_none());
    assert!(result.artifacts.cast_file().is_none());
    assert!(result.artifacts.screenshot_file().is_none());

    let log = std::fs::read_to_string(result.artifacts.log_file()).expect("log");
    assert!(!log.is_empty());
    assert!(log.contains("activating the configuration"));

    let sent = session.sent_commands();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("sudo nixos-rebuild test --flake .#; printf"));
    assert_eq!(session.destroy_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_marker_after_wait_counts_as_failure() {
    // wait succeeds because the pattern check is skipped, but the screen
    // never shows the marker
    struct BlindSession(ScriptedSession);

    #[async_trait::async_trait]
    impl rebuild_core::TerminalSession for BlindSession {
        async fn send_command(&self, text: &str) -> rebuild_core::SessionResult<()> {
            self.0.send_command(text).await
        }
        async fn capture_frame(&self) -> rebuild_core::SessionResult<String> {
            Ok("screen without any marker".to_string())
        }
        async fn wait_for_pattern(
            &self,
            _pattern: &regex::Regex,
            _timeout: Duration,
        ) -> rebuild_core::SessionResult<bool> {
            Ok(true)
        }
        async fn destroy(&self) -> rebuild_core::SessionResult<()> {
            self.0.destroy().await
        }
    }

    let session = BlindSession(ScriptedSession::new());
    let outcome = CommandRunner::new()
        .run(&session, &RebuildConfig::default())
        .await
        .expect("run");

    assert_eq!(outcome.exit_code, 1);
    assert!(!outcome.is_success());
    assert!(outcome.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn full_recording_produces_all_requested_artifacts() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.recording.export_gif = true;
    config.output.base_dir = tmp.path().to_path_buf();

    let session = Arc::new(
        ScriptedSession::new()
            .with_output("these 3 derivations will be built:")
            .with_exit_code(0),
    );
    let app = RebuildApplication::with_components(
        config,
        Arc::new(ScriptedBackend::new(session)),
        Arc::new(LocalFileSystem::new()),
        Arc::new(MemoryBuildRepository::new()),
    )
    .expect("app");

    let result = app.run_rebuild().await;
    assert!(result.success);
    assert!(result.artifacts.cast_file().is_some());
    assert!(result.artifacts.screenshot_file().is_some());
    assert!(result.artifacts.gif_file().is_some());
    assert_eq!(result.artifacts.all_files().len(), 4);
}
