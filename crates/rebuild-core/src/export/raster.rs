//! Screenshot (PNG) and animation (GIF) rendering of captured frames.
//!
//! Each terminal cell is drawn with the 8x8 `font8x8` bitmap glyph of its
//! character, doubled vertically. Digits and punctuation get their own
//! colours, and lines that mention an error are drawn in red.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use font8x8::{UnicodeFonts, BASIC_FONTS, BLOCK_FONTS, BOX_FONTS, LATIN_FONTS};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use super::{ArtifactExporter, ArtifactKind, CaptureData};
use crate::domain::{Result, TerminalDimensions};

const GLYPH_SIZE: u32 = 8;
const CELL_WIDTH: u32 = GLYPH_SIZE;
const CELL_HEIGHT: u32 = GLYPH_SIZE * 2;

/// Drawn for characters none of the fonts cover.
const MISSING_GLYPH: [u8; 8] = [0x7e, 0x42, 0x42, 0x42, 0x42, 0x42, 0x7e, 0x00];

const BACKGROUND: Rgba<u8> = Rgba([24, 24, 27, 255]);
const TEXT: Rgba<u8> = Rgba([212, 212, 216, 255]);
const DIGIT: Rgba<u8> = Rgba([125, 180, 240, 255]);
const PUNCT: Rgba<u8> = Rgba([140, 140, 150, 255]);
const ERROR_LINE: Rgba<u8> = Rgba([230, 90, 90, 255]);

/// Most frames written to an animation.
pub const MAX_GIF_FRAMES: usize = 300;

/// Longest delay between animation frames.
const MAX_GIF_DELAY: Duration = Duration::from_secs(2);

/// Render one frame of text onto a character grid of `dimensions`.
pub fn render_frame(frame: &str, dimensions: TerminalDimensions) -> RgbaImage {
    let cols = u32::from(dimensions.width());
    let rows = u32::from(dimensions.height());
    let mut img = RgbaImage::from_pixel(cols * CELL_WIDTH, rows * CELL_HEIGHT, BACKGROUND);

    for (row, line) in frame.lines().take(rows as usize).enumerate() {
        let is_error = line.to_ascii_lowercase().contains("error");
        for (col, ch) in line.chars().take(cols as usize).enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let color = if is_error {
                ERROR_LINE
            } else if ch.is_ascii_digit() {
                DIGIT
            } else if ch.is_alphanumeric() {
                TEXT
            } else {
                PUNCT
            };
            draw_glyph(&mut img, col as u32, row as u32, glyph(ch), color);
        }
    }
    img
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BOX_FONTS.get(ch))
        .or_else(|| BLOCK_FONTS.get(ch))
        .unwrap_or(MISSING_GLYPH)
}

fn draw_glyph(img: &mut RgbaImage, col: u32, row: u32, bitmap: [u8; 8], color: Rgba<u8>) {
    let x0 = col * CELL_WIDTH;
    let y0 = row * CELL_HEIGHT;
    for (gy, bits) in (0u32..).zip(bitmap) {
        for gx in 0..GLYPH_SIZE {
            // bit 0 is the leftmost pixel
            if bits & (1 << gx) == 0 {
                continue;
            }
            img.put_pixel(x0 + gx, y0 + gy * 2, color);
            img.put_pixel(x0 + gx, y0 + gy * 2 + 1, color);
        }
    }
}

/// Evenly spaced indices into `len` frames, at most `max`, always keeping
/// the last frame.
pub fn sample_indices(len: usize, max: usize) -> Vec<usize> {
    if len <= max {
        return (0..len).collect();
    }
    if max == 0 {
        return Vec::new();
    }
    if max == 1 {
        return vec![len - 1];
    }
    (0..max).map(|i| i * (len - 1) / (max - 1)).collect()
}

/// Final frame as a PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenshotExporter;

#[async_trait]
impl ArtifactExporter for ScreenshotExporter {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Screenshot
    }

    async fn export(&self, capture: &CaptureData, output_path: &Path) -> Result<PathBuf> {
        let kind = self.kind();
        let frame = capture
            .last_frame()
            .ok_or_else(|| kind.failure("no frames captured"))?
            .to_string();
        let dimensions = capture.dimensions;

        let bytes = tokio::task::spawn_blocking(move || {
            let img = DynamicImage::ImageRgba8(render_frame(&frame, dimensions));
            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
            Ok::<_, image::ImageError>(png)
        })
        .await
        .map_err(|e| kind.failure(e))?
        .map_err(|e| kind.failure(e))?;

        tokio::fs::write(output_path, bytes).await?;
        Ok(output_path.to_path_buf())
    }
}

/// Looping animation over a sample of the captured frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct GifExporter;

impl GifExporter {
    fn encode(
        frames: Vec<String>,
        dimensions: TerminalDimensions,
        delay: Duration,
    ) -> image::ImageResult<Vec<u8>> {
        let delay = Delay::from_numer_denom_ms(delay.as_millis() as u32, 1);
        let mut gif = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut gif, 10);
            encoder.set_repeat(Repeat::Infinite)?;
            encoder.encode_frames(
                frames
                    .iter()
                    .map(|f| Frame::from_parts(render_frame(f, dimensions), 0, 0, delay)),
            )?;
        }
        Ok(gif)
    }
}

#[async_trait]
impl ArtifactExporter for GifExporter {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Gif
    }

    async fn export(&self, capture: &CaptureData, output_path: &Path) -> Result<PathBuf> {
        let kind = self.kind();
        if capture.frames.is_empty() {
            return Err(kind.failure("no frames captured"));
        }

        let indices = sample_indices(capture.frames.len(), MAX_GIF_FRAMES);
        let step = (capture.frames.len() / indices.len()).max(1) as u32;
        let delay = (capture.capture_interval * step).min(MAX_GIF_DELAY);
        let frames: Vec<String> = indices
            .into_iter()
            .map(|i| capture.frames[i].clone())
            .collect();
        debug!(frames = frames.len(), delay_ms = delay.as_millis() as u64, "encoding gif");

        let dimensions = capture.dimensions;
        let bytes = tokio::task::spawn_blocking(move || Self::encode(frames, dimensions, delay))
            .await
            .map_err(|e| kind.failure(e))?
            .map_err(|e| kind.failure(e))?;

        tokio::fs::write(output_path, bytes).await?;
        Ok(output_path.to_path_buf())
    }
}
