use std::sync::Arc;

use super::{
    ArtifactExporter, CastExporter, ExportPipeline, GifExporter, LogExporter, ScreenshotExporter,
};
use crate::config::RecordingConfig;

/// Picks the exporters a recording configuration asks for.
pub struct ExporterRegistry;

impl ExporterRegistry {
    /// The log exporter always; cast, screenshot and gif only when recording
    /// is enabled and the matching flag is set.
    pub fn create_exporters(config: &RecordingConfig) -> Vec<Arc<dyn ArtifactExporter>> {
        let mut exporters: Vec<Arc<dyn ArtifactExporter>> = vec![Arc::new(LogExporter)];
        if config.enabled {
            exporters.push(Arc::new(CastExporter));
            if config.export_screenshot {
                exporters.push(Arc::new(ScreenshotExporter));
            }
            if config.export_gif {
                exporters.push(Arc::new(GifExporter));
            }
        }
        exporters
    }

    pub fn pipeline(config: &RecordingConfig) -> ExportPipeline {
        ExportPipeline::new(Self::create_exporters(config))
    }
}
