//! Immutable value objects: build ids, terminal dimensions, error messages
//! and the canonical build output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use super::error::{RebuildError, Result};

/// Prefix shared by every build directory name.
pub const BUILD_DIR_PREFIX: &str = "rebuild-";

/// `strftime` format used in build directory names.
pub const BUILD_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub const LOG_FILE_NAME: &str = "rebuild.log";
pub const CAST_FILE_NAME: &str = "rebuild.cast";
pub const SCREENSHOT_FILE_NAME: &str = "final.png";
pub const GIF_FILE_NAME: &str = "rebuild.gif";
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Maximum length of an [`ErrorMessage`] in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Unique identifier for a build: wall-clock timestamp plus a sequence that
/// disambiguates builds started within the same second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildId {
    timestamp: DateTime<Local>,
    sequence: u32,
}

impl BuildId {
    /// Generate a build id for the current instant.
    pub fn generate() -> Self {
        Self::new(Local::now(), 0)
    }

    pub fn new(timestamp: DateTime<Local>, sequence: u32) -> Self {
        Self {
            timestamp,
            sequence,
        }
    }

    /// Same timestamp, different sequence.
    pub fn with_sequence(&self, sequence: u32) -> Self {
        Self {
            timestamp: self.timestamp,
            sequence,
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Filesystem-safe directory name: `rebuild-YYYYMMDD-HHMMSS`, with a
    /// `-N` suffix when `sequence > 0`.
    pub fn dir_name(&self) -> String {
        let base = format!(
            "{}{}",
            BUILD_DIR_PREFIX,
            self.timestamp.format(BUILD_TIMESTAMP_FORMAT)
        );
        if self.sequence > 0 {
            format!("{}-{}", base, self.sequence)
        } else {
            base
        }
    }

    /// Parse a directory name produced by [`BuildId::dir_name`].
    ///
    /// The recovered timestamp has one-second resolution.
    pub fn parse_dir_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(BUILD_DIR_PREFIX)?;
        // "YYYYMMDD-HHMMSS" is 15 characters
        if rest.len() < 15 || !rest.is_char_boundary(15) {
            return None;
        }
        let (stamp, suffix) = rest.split_at(15);
        let naive = NaiveDateTime::parse_from_str(stamp, BUILD_TIMESTAMP_FORMAT).ok()?;
        let timestamp = Local.from_local_datetime(&naive).earliest()?;

        let sequence = match suffix {
            "" => 0,
            s => s.strip_prefix('-')?.parse().ok()?,
        };
        Some(Self::new(timestamp, sequence))
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDimensions {
    width: u16,
    height: u16,
}

impl TerminalDimensions {
    pub const MIN_WIDTH: u16 = 40;
    pub const MAX_WIDTH: u16 = 200;
    pub const MIN_HEIGHT: u16 = 20;
    pub const MAX_HEIGHT: u16 = 100;

    pub fn new(width: u16, height: u16) -> Result<Self> {
        if !(Self::MIN_WIDTH..=Self::MAX_WIDTH).contains(&width) {
            return Err(RebuildError::InvalidConfig(format!(
                "terminal width {} outside {}..={}",
                width,
                Self::MIN_WIDTH,
                Self::MAX_WIDTH
            )));
        }
        if !(Self::MIN_HEIGHT..=Self::MAX_HEIGHT).contains(&height) {
            return Err(RebuildError::InvalidConfig(format!(
                "terminal height {} outside {}..={}",
                height,
                Self::MIN_HEIGHT,
                Self::MAX_HEIGHT
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }
}

impl Default for TerminalDimensions {
    fn default() -> Self {
        Self {
            width: 120,
            height: 40,
        }
    }
}

/// Where an [`ErrorMessage`] was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Stderr,
    Frame,
    ExitCode,
    Exception,
}

/// Error message with its source.
///
/// Content is trimmed, never empty and at most
/// [`MAX_ERROR_MESSAGE_CHARS`] characters long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    content: String,
    source: ErrorSource,
    timestamp: Option<DateTime<Local>>,
}

impl ErrorMessage {
    /// Validate and build an error message stamped with the current time.
    pub fn new(content: impl Into<String>, source: ErrorSource) -> Result<Self> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(RebuildError::InvalidErrorMessage(
                "content cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_ERROR_MESSAGE_CHARS {
            return Err(RebuildError::InvalidErrorMessage(format!(
                "content exceeds {} characters",
                MAX_ERROR_MESSAGE_CHARS
            )));
        }
        Ok(Self {
            content: trimmed.to_string(),
            source,
            timestamp: Some(Local::now()),
        })
    }

    /// Build an error message from arbitrary text, truncating over-long
    /// content and substituting a placeholder for blank content.
    pub fn from_text(text: &str, source: ErrorSource) -> Self {
        let trimmed = text.trim();
        let content = if trimmed.is_empty() {
            "unknown error".to_string()
        } else {
            truncate_chars(trimmed, MAX_ERROR_MESSAGE_CHARS).trim_end().to_string()
        };
        Self {
            content,
            source,
            timestamp: Some(Local::now()),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> ErrorSource {
        self.source
    }

    pub fn timestamp(&self) -> Option<DateTime<Local>> {
        self.timestamp
    }
}

impl std::fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content)
    }
}

/// Per-build output directory. Artifact paths are derived from it by a fixed
/// suffix convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDirectory {
    path: PathBuf,
    build_id: BuildId,
}

impl OutputDirectory {
    pub fn new(path: impl Into<PathBuf>, build_id: BuildId) -> Result<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(RebuildError::RelativeOutputDirectory(path));
        }
        Ok(Self { path, build_id })
    }

    /// Caller guarantees `path` is absolute.
    pub(crate) fn from_absolute(path: PathBuf, build_id: BuildId) -> Self {
        debug_assert!(path.is_absolute());
        Self { path, build_id }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    pub fn log_file(&self) -> PathBuf {
        self.path.join(LOG_FILE_NAME)
    }

    pub fn cast_file(&self) -> PathBuf {
        self.path.join(CAST_FILE_NAME)
    }

    pub fn screenshot_file(&self) -> PathBuf {
        self.path.join(SCREENSHOT_FILE_NAME)
    }

    pub fn gif_file(&self) -> PathBuf {
        self.path.join(GIF_FILE_NAME)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.path.join(METADATA_FILE_NAME)
    }
}

/// Human-readable duration, e.g. `5m30s` or `12s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let mins = total / 60;
    let secs = total % 60;
    if mins > 0 {
        format!("{}m{}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// First `max` characters of `text`, respecting char boundaries.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time() -> DateTime<Local> {
        let naive = NaiveDateTime::parse_from_str("20250314-093005", BUILD_TIMESTAMP_FORMAT)
            .unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    #[test]
    fn test_build_id_dir_name() {
        let id = BuildId::new(fixed_time(), 0);
        assert_eq!(id.dir_name(), "rebuild-20250314-093005");
        assert_eq!(id.with_sequence(2).dir_name(), "rebuild-20250314-093005-2");
    }

    #[test]
    fn test_build_id_parse_dir_name() {
        let id = BuildId::new(fixed_time(), 3);
        let parsed = BuildId::parse_dir_name(&id.dir_name()).unwrap();
        assert_eq!(parsed, id);

        assert!(BuildId::parse_dir_name("rebuild-garbage").is_none());
        assert!(BuildId::parse_dir_name("other-20250314-093005").is_none());
        assert!(BuildId::parse_dir_name("rebuild-20250314-093005x").is_none());
    }

    #[test]
    fn test_terminal_dimensions_bounds() {
        assert!(TerminalDimensions::new(120, 40).is_ok());
        assert!(TerminalDimensions::new(39, 40).is_err());
        assert!(TerminalDimensions::new(201, 40).is_err());
        assert!(TerminalDimensions::new(120, 19).is_err());
        assert!(TerminalDimensions::new(120, 101).is_err());
    }

    #[test]
    fn test_error_message_validation() {
        let msg = ErrorMessage::new("  error: boom  ", ErrorSource::Frame).unwrap();
        assert_eq!(msg.content(), "error: boom");
        assert_eq!(msg.source(), ErrorSource::Frame);

        assert!(ErrorMessage::new("   ", ErrorSource::Stderr).is_err());
        assert!(ErrorMessage::new("x".repeat(501), ErrorSource::Stderr).is_err());
        assert!(ErrorMessage::new("x".repeat(500), ErrorSource::Stderr).is_ok());
    }

    #[test]
    fn test_error_message_from_text_truncates() {
        let msg = ErrorMessage::from_text(&"é".repeat(600), ErrorSource::Exception);
        assert_eq!(msg.content().chars().count(), MAX_ERROR_MESSAGE_CHARS);

        let blank = ErrorMessage::from_text("\n\t", ErrorSource::Exception);
        assert_eq!(blank.content(), "unknown error");
    }

    #[test]
    fn test_output_directory_paths() {
        let id = BuildId::new(fixed_time(), 0);
        let dir = OutputDirectory::new("/var/log/rebuilds/rebuild-20250314-093005", id).unwrap();
        assert!(dir.log_file().ends_with("rebuild.log"));
        assert!(dir.cast_file().ends_with("rebuild.cast"));
        assert!(dir.screenshot_file().ends_with("final.png"));
        assert!(dir.gif_file().ends_with("rebuild.gif"));
        assert!(dir.metadata_file().ends_with("metadata.json"));
    }

    #[test]
    fn test_output_directory_rejects_relative_path() {
        let err = OutputDirectory::new("rebuild-logs/x", BuildId::generate()).unwrap_err();
        assert!(matches!(err, RebuildError::RelativeOutputDirectory(_)));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(12)), "12s");
        assert_eq!(format_duration(Duration::from_secs(330)), "5m30s");
    }
}
