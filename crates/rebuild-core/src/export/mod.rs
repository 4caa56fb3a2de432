//! Artifact export: the exporter trait, the parallel pipeline and the
//! concrete log, asciinema and raster encoders.

pub mod cast;
pub mod log;
pub mod pipeline;
pub mod raster;
pub mod registry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::domain::{
    OutputDirectory, RebuildError, Result, TerminalDimensions, CAST_FILE_NAME, GIF_FILE_NAME,
    LOG_FILE_NAME, SCREENSHOT_FILE_NAME,
};

pub use cast::CastExporter;
pub use log::LogExporter;
pub use pipeline::ExportPipeline;
pub use raster::{GifExporter, ScreenshotExporter};
pub use registry::ExporterRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Log,
    Cast,
    Screenshot,
    Gif,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Log => LOG_FILE_NAME,
            ArtifactKind::Cast => CAST_FILE_NAME,
            ArtifactKind::Screenshot => SCREENSHOT_FILE_NAME,
            ArtifactKind::Gif => GIF_FILE_NAME,
        }
    }

    pub fn path_in(&self, output_dir: &OutputDirectory) -> PathBuf {
        output_dir.path().join(self.file_name())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Log => "log",
            ArtifactKind::Cast => "cast",
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Gif => "gif",
        }
    }

    pub(crate) fn failure(&self, reason: impl fmt::Display) -> RebuildError {
        RebuildError::ExportFailed {
            kind: self.as_str().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything captured during one run, in capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureData {
    pub frames: Vec<String>,
    pub dimensions: TerminalDimensions,
    /// Wall-clock spacing between recorded frames.
    pub capture_interval: Duration,
    pub started_at: DateTime<Local>,
}

impl CaptureData {
    pub fn new(
        frames: Vec<String>,
        dimensions: TerminalDimensions,
        capture_interval: Duration,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            frames,
            dimensions,
            capture_interval,
            started_at,
        }
    }

    pub fn last_frame(&self) -> Option<&str> {
        self.frames.last().map(String::as_str)
    }
}

/// Writes one artifact kind.
#[async_trait]
pub trait ArtifactExporter: Send + Sync {
    fn kind(&self) -> ArtifactKind;

    /// Write the artifact to `output_path` and return the written path.
    async fn export(&self, capture: &CaptureData, output_path: &Path) -> Result<PathBuf>;
}
