use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ArtifactExporter, ArtifactKind, CaptureData};
use crate::domain::Result;

/// Width of the separator line written after each frame.
const SEPARATOR_WIDTH: usize = 80;

/// Plain-text log: every frame followed by a line of `=`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExporter;

impl LogExporter {
    pub fn render(frames: &[String]) -> String {
        let separator = "=".repeat(SEPARATOR_WIDTH);
        let mut out = String::new();
        for frame in frames {
            out.push_str(frame);
            out.push('\n');
            out.push_str(&separator);
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl ArtifactExporter for LogExporter {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Log
    }

    async fn export(&self, capture: &CaptureData, output_path: &Path) -> Result<PathBuf> {
        tokio::fs::write(output_path, Self::render(&capture.frames)).await?;
        Ok(output_path.to_path_buf())
    }
}
