//! Composition root: wires the executor, exporters and storage together and
//! runs one rebuild end to end.
//!
//! [`RebuildApplication::run_rebuild`] never fails. Every internal failure is
//! classified as a [`RunFailure`] and recorded as a failed
//! [`RebuildResult`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn, Instrument};

use crate::config::Config;
use crate::domain::{
    BuildId, ErrorMessage, ErrorSource, OutputDirectory, RebuildError, RebuildResult,
    RebuildSession, Result,
};
use crate::execution::{
    CommandRunner, ExecutionError, FrameRecorder, RebuildExecutor, SessionManager,
    DEFAULT_MAX_FRAMES,
};
use crate::export::{CaptureData, ExportPipeline, ExporterRegistry, LogExporter};
use crate::obs::{emit_build_finished, emit_build_started, emit_export_finished, BuildSpan};
use crate::storage::{
    BuildCleaner, BuildDirectoryManager, BuildRepository, FileSystem, FsBuildRepository,
    LocalFileSystem, RetentionPolicy,
};
use crate::terminal::TerminalBackend;

/// Directory under the system temp dir used when the configured output
/// directory cannot be created.
const FALLBACK_DIR_NAME: &str = "nixos-rebuild-tester";

/// Base directory for builds whose configured output directory could not be
/// created.
pub fn fallback_base_dir() -> PathBuf {
    std::env::temp_dir().join(FALLBACK_DIR_NAME)
}

/// Why a run ended without a usable execution outcome.
#[derive(Debug, thiserror::Error)]
pub enum RunFailure {
    #[error("invalid configuration: {0}")]
    Config(#[source] RebuildError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("could not finalize rebuild session: {0}")]
    Session(#[source] RebuildError),
}

impl RunFailure {
    pub fn error_message(&self) -> ErrorMessage {
        ErrorMessage::from_text(&self.to_string(), ErrorSource::Exception)
    }
}

pub struct RebuildApplication {
    config: Config,
    fs: Arc<dyn FileSystem>,
    directories: BuildDirectoryManager,
    repository: Arc<dyn BuildRepository>,
    executor: RebuildExecutor,
    exporters: ExportPipeline,
    cleaner: BuildCleaner,
}

impl RebuildApplication {
    /// Application over the local filesystem with metadata stored under the
    /// configured output directory. Builds that landed in the fallback
    /// directory stay visible to listing and retention.
    pub fn new(config: Config, backend: Arc<dyn TerminalBackend>) -> Result<Self> {
        config.validate()?;
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
        let directories = BuildDirectoryManager::new(&config.output.base_dir, Arc::clone(&fs))?;
        let repository: Arc<dyn BuildRepository> = Arc::new(
            FsBuildRepository::new(directories.base_dir(), Arc::clone(&fs))
                .with_fallback_root(fallback_base_dir()),
        );
        Ok(Self::assemble(config, backend, fs, directories, repository))
    }

    pub fn with_components(
        config: Config,
        backend: Arc<dyn TerminalBackend>,
        fs: Arc<dyn FileSystem>,
        repository: Arc<dyn BuildRepository>,
    ) -> Result<Self> {
        config.validate()?;
        let directories = BuildDirectoryManager::new(&config.output.base_dir, Arc::clone(&fs))?;
        Ok(Self::assemble(config, backend, fs, directories, repository))
    }

    fn assemble(
        config: Config,
        backend: Arc<dyn TerminalBackend>,
        fs: Arc<dyn FileSystem>,
        directories: BuildDirectoryManager,
        repository: Arc<dyn BuildRepository>,
    ) -> Self {
        let executor = RebuildExecutor::new(
            SessionManager::new(backend),
            CommandRunner::new(),
            FrameRecorder::new(),
        );
        let exporters = ExporterRegistry::pipeline(&config.recording);
        let cleaner = BuildCleaner::new(
            Arc::clone(&repository),
            RetentionPolicy::new(config.output.keep_last_n),
        );

        Self {
            config,
            fs,
            directories,
            repository,
            executor,
            exporters,
            cleaner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn BuildRepository> {
        Arc::clone(&self.repository)
    }

    /// Run one rebuild and record it. Always returns a result.
    pub async fn run_rebuild(&self) -> RebuildResult {
        let build_id = self
            .directories
            .allocate_build_id(BuildId::generate())
            .await;
        let span = BuildSpan::new(&build_id.dir_name());
        self.run(build_id).instrument(span.into_span()).await
    }

    async fn run(&self, build_id: BuildId) -> RebuildResult {
        let output_dir = self.prepare_output_dir(&build_id).await;
        let mut session =
            RebuildSession::with_id(output_dir.build_id().clone(), self.config.rebuild.clone());
        let id = session.session_id().dir_name();
        emit_build_started(
            &id,
            session.config().action.as_str(),
            session.config().flake_ref.as_str(),
        );

        let result = match self.execute(&mut session, &output_dir).await {
            Ok(result) => result,
            Err(failure) => self.record_failure(&mut session, failure, &output_dir).await,
        };

        emit_build_finished(
            &id,
            result.exit_code,
            (result.duration_seconds * 1000.0) as u64,
            result.success,
        );

        if let Err(e) = self.repository.save(&result).await {
            warn!(error = %e, "failed to save build metadata");
        }
        if let Err(e) = self.cleaner.cleanup(None).await {
            warn!(error = %e, "build cleanup failed");
        }
        result
    }

    async fn execute(
        &self,
        session: &mut RebuildSession,
        output_dir: &OutputDirectory,
    ) -> std::result::Result<RebuildResult, RunFailure> {
        session.start().map_err(RunFailure::Session)?;
        let dimensions = self
            .config
            .recording
            .dimensions()
            .map_err(RunFailure::Config)?;
        let rebuild = session.config().clone();
        let interval = rebuild.capture_interval();

        let (outcome, terminal) = self
            .executor
            .execute(&rebuild, dimensions, interval, DEFAULT_MAX_FRAMES)
            .await?;

        let capture = Arc::new(CaptureData::new(
            outcome.frames.clone(),
            dimensions,
            interval,
            session.started_at(),
        ));
        let produced = self.exporters.export_all(capture, output_dir).await;
        emit_export_finished(
            &session.session_id().dir_name(),
            self.exporters.kinds().len(),
            produced.len(),
        );
        self.executor.sessions().cleanup(terminal.as_ref()).await;

        session
            .complete(&outcome, output_dir, self.fs.as_ref())
            .await
            .map_err(RunFailure::Session)
    }

    async fn record_failure(
        &self,
        session: &mut RebuildSession,
        failure: RunFailure,
        output_dir: &OutputDirectory,
    ) -> RebuildResult {
        warn!(error = %failure, "rebuild failed");

        if let RunFailure::Execution(ExecutionError::Timeout { frames, .. }) = &failure {
            let log = LogExporter::render(frames);
            if let Err(e) = self.fs.write_text(&output_dir.log_file(), &log).await {
                warn!(error = %e, "failed to write timeout log");
            }
        }

        let message = failure.error_message();
        match session.fail(&message, output_dir, self.fs.as_ref()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "session could not be failed, recording failure directly");
                session
                    .failure_result(&message, output_dir, self.fs.as_ref())
                    .await
            }
        }
    }

    /// The configured build directory, a directory under the system temp dir
    /// when that cannot be created, or the uncreated configured path as a
    /// last resort. The fallback may bump the build id's sequence.
    async fn prepare_output_dir(&self, build_id: &BuildId) -> OutputDirectory {
        let primary = match self.directories.create_for_build(build_id).await {
            Ok(dir) => return dir,
            Err(e) => e,
        };
        warn!(error = %primary, "output directory unusable, falling back to temp dir");

        let fallback = match BuildDirectoryManager::new(fallback_base_dir(), Arc::clone(&self.fs)) {
            Ok(manager) => {
                let id = manager.allocate_build_id(build_id.clone()).await;
                manager.create_for_build(&id).await
            }
            Err(e) => Err(e),
        };
        match fallback {
            Ok(dir) => {
                info!(path = %dir.path().display(), "using fallback output directory");
                dir
            }
            Err(e) => {
                warn!(error = %e, "fallback output directory unusable");
                self.directories.get_build_directory(build_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RebuildAction;
    use crate::fakes::{MemoryBuildRepository, ScriptedBackend, ScriptedSession, WaitBehavior};

    fn config(base: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.output.base_dir = base.to_path_buf();
        config.rebuild.capture_interval_secs = 1.0;
        config
    }

    fn app(config: Config, session: Arc<ScriptedSession>) -> RebuildApplication {
        RebuildApplication::with_components(
            config,
            Arc::new(ScriptedBackend::new(session)),
            Arc::new(LocalFileSystem::new()),
            Arc::new(MemoryBuildRepository::new()),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_creation_failure_is_failed_result() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let app = RebuildApplication::with_components(
            config(tmp.path()),
            Arc::new(ScriptedBackend::failing("openpty failed")),
            Arc::new(LocalFileSystem::new()),
            Arc::new(MemoryBuildRepository::new()),
        )
        .unwrap();

        let result = app.run_rebuild().await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 255);
        assert_eq!(result.duration_seconds, 0.0);
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .contains("openpty failed"));
        assert!(result.artifacts.log_file().is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_writes_captured_frames_to_log() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let session = Arc::new(
            ScriptedSession::new()
                .with_output("building '/nix/store/slow.drv'...")
                .with_wait(WaitBehavior::Timeout),
        );
        let result = app(config(tmp.path()), session.clone()).run_rebuild().await;

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("timed out"));
        let log = std::fs::read_to_string(result.artifacts.log_file()).unwrap();
        assert!(log.contains("slow.drv"));
        assert_eq!(session.destroy_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rebuild_keeps_exit_code() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let session = Arc::new(
            ScriptedSession::new()
                .with_output("error: The option `services.foo' does not exist.")
                .with_exit_code(1),
        );
        let mut config = config(tmp.path());
        config.rebuild.action = RebuildAction::Build;
        let result = app(config, session.clone()).run_rebuild().await;

        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.action, RebuildAction::Build);
        assert!(result
            .error_message
            .unwrap()
            .starts_with("error: The option"));
        assert!(result.artifacts.cast_file().is_some());
        assert_eq!(session.destroy_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_output_dir_falls_back() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "file in the way").unwrap();

        let session = Arc::new(ScriptedSession::new().with_exit_code(0));
        let result = app(config(&blocker), session).run_rebuild().await;

        assert!(result.success);
        assert!(result.output_dir.starts_with(std::env::temp_dir()));
        assert!(result.artifacts.log_file().is_file());
        std::fs::remove_dir_all(&result.output_dir).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_build_is_listed() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "file in the way").unwrap();

        let session = Arc::new(ScriptedSession::new().with_exit_code(0));
        let app = RebuildApplication::new(
            config(&blocker),
            Arc::new(ScriptedBackend::new(session)),
        )
        .unwrap();
        let result = app.run_rebuild().await;
        assert!(result.output_dir.starts_with(fallback_base_dir()));

        let repository = app.repository();
        let found = repository.find_by_id(&result.build_id).await.unwrap();
        assert_eq!(found.as_ref().map(|r| &r.build_id), Some(&result.build_id));
        let recent = repository.find_recent(None).await.unwrap();
        assert!(recent.iter().any(|r| r.build_id == result.build_id));

        repository.delete(&result.build_id).await.unwrap();
        assert!(!result.output_dir.exists());
    }

    #[test]
    fn test_run_failure_message_source() {
        let failure = RunFailure::Execution(ExecutionError::Timeout {
            timeout: std::time::Duration::from_secs(60),
            frames: Vec::new(),
        });
        let message = failure.error_message();
        assert_eq!(message.source(), ErrorSource::Exception);
        assert_eq!(message.content(), "rebuild timed out after 60s");
    }
}
