use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{ArtifactExporter, ArtifactKind, CaptureData};
use crate::domain::OutputDirectory;

/// Runs every exporter concurrently over the same capture.
#[derive(Clone, Default)]
pub struct ExportPipeline {
    exporters: Vec<Arc<dyn ArtifactExporter>>,
}

impl ExportPipeline {
    pub fn new(exporters: Vec<Arc<dyn ArtifactExporter>>) -> Self {
        Self { exporters }
    }

    pub fn kinds(&self) -> Vec<ArtifactKind> {
        self.exporters.iter().map(|e| e.kind()).collect()
    }

    /// Export every artifact into `output_dir`.
    ///
    /// Each exporter writes to the canonical path for its kind. A failing
    /// exporter is logged and skipped; the paths of the ones that succeeded
    /// are returned in exporter order.
    pub async fn export_all(
        &self,
        capture: Arc<CaptureData>,
        output_dir: &OutputDirectory,
    ) -> Vec<PathBuf> {
        let mut join_set = JoinSet::new();
        for (idx, exporter) in self.exporters.iter().enumerate() {
            let exporter = Arc::clone(exporter);
            let capture = Arc::clone(&capture);
            let kind = exporter.kind();
            let path = kind.path_in(output_dir);
            join_set.spawn(async move {
                let result = exporter.export(&capture, &path).await;
                (idx, kind, result)
            });
        }

        let mut produced: Vec<Option<PathBuf>> = vec![None; self.exporters.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, kind, Ok(path))) => {
                    debug!(kind = %kind, path = %path.display(), "artifact exported");
                    produced[idx] = Some(path);
                }
                Ok((_, kind, Err(e))) => {
                    warn!(kind = %kind, error = %e, "artifact export failed");
                }
                Err(e) => warn!(error = %e, "export task join error"),
            }
        }
        produced.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildId, Result, TerminalDimensions};
    use crate::export::{CastExporter, LogExporter};
    use async_trait::async_trait;
    use chrono::Local;
    use std::path::Path;
    use std::time::Duration;

    struct BrokenExporter;

    #[async_trait]
    impl ArtifactExporter for BrokenExporter {
        fn kind(&self) -> ArtifactKind {
            ArtifactKind::Screenshot
        }

        async fn export(&self, _capture: &CaptureData, _output_path: &Path) -> Result<PathBuf> {
            Err(self.kind().failure("encoder crashed"))
        }
    }

    #[tokio::test]
    async fn test_one_failure_keeps_other_artifacts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let id = BuildId::generate();
        let dir = OutputDirectory::new(tmp.path().join(id.dir_name()), id).unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();

        let pipeline = ExportPipeline::new(vec![
            Arc::new(LogExporter),
            Arc::new(BrokenExporter),
            Arc::new(CastExporter),
        ]);
        let capture = Arc::new(CaptureData::new(
            vec!["frame".to_string()],
            TerminalDimensions::default(),
            Duration::from_secs(1),
            Local::now(),
        ));

        let paths = pipeline.export_all(capture, &dir).await;
        assert_eq!(paths, vec![dir.log_file(), dir.cast_file()]);
        assert!(dir.log_file().is_file());
        assert!(dir.cast_file().is_file());
        assert!(!dir.screenshot_file().exists());
    }
}
