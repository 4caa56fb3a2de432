//! asciinema v2 recordings built from captured frames.
//!
//! Each frame becomes one output event that clears the screen and redraws
//! it, so playback shows the screen as it was at each capture.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use super::{ArtifactExporter, ArtifactKind, CaptureData};
use crate::domain::Result;

const CLEAR_AND_HOME: &str = "\x1b[2J\x1b[H";

#[derive(Debug, Clone, Copy, Default)]
pub struct CastExporter;

impl CastExporter {
    pub fn render(capture: &CaptureData) -> String {
        let header = json!({
            "version": 2,
            "width": capture.dimensions.width(),
            "height": capture.dimensions.height(),
            "timestamp": capture.started_at.timestamp(),
        });

        let interval = capture.capture_interval.as_secs_f64();
        let mut out = header.to_string();
        out.push('\n');
        for (i, frame) in capture.frames.iter().enumerate() {
            let data = format!("{}{}", CLEAR_AND_HOME, frame.replace('\n', "\r\n"));
            out.push_str(&json!([i as f64 * interval, "o", data]).to_string());
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl ArtifactExporter for CastExporter {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Cast
    }

    async fn export(&self, capture: &CaptureData, output_path: &Path) -> Result<PathBuf> {
        tokio::fs::write(output_path, Self::render(capture)).await?;
        Ok(output_path.to_path_buf())
    }
}
