//! Failure classification from terminal frames, stderr text and exit codes.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use super::value_objects::{truncate_chars, ErrorMessage, ErrorSource};

/// Longest snippet taken from a text source.
const MAX_SNIPPET_CHARS: usize = 200;

/// Checked in order against a single text blob.
const ERROR_PATTERNS: &[&str] = &[
    r"error:.*",
    r"failed with exit code.*",
    r"build failed.*",
    r"cannot build.*",
    r"builder for.*failed.*",
    r"assertion failed.*",
];

fn patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        ERROR_PATTERNS
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .expect("error patterns are valid regexes")
            })
            .collect()
    })
}

/// Stateless error classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorDetector;

impl ErrorDetector {
    pub fn new() -> Self {
        Self
    }

    /// Best available explanation for `exit_code`.
    ///
    /// Returns `None` iff `exit_code == 0`. Otherwise the last frame is tried
    /// first, then stderr, then the exit-code table, so a message is always
    /// produced for a failure.
    pub fn extract_best_error(
        &self,
        exit_code: i32,
        frames: Option<&[String]>,
        stderr: Option<&str>,
    ) -> Option<ErrorMessage> {
        if exit_code == 0 {
            return None;
        }

        if let Some(msg) = frames.and_then(|f| self.extract_from_frames(f)) {
            return Some(msg);
        }
        if let Some(msg) = stderr.and_then(|s| self.extract_from_stderr(s)) {
            return Some(msg);
        }
        Some(self.extract_from_exit_code(exit_code))
    }

    /// Scan only the last frame; the last pattern match wins.
    pub fn extract_from_frames(&self, frames: &[String]) -> Option<ErrorMessage> {
        let last = frames.last()?;
        last_match(last).map(|m| ErrorMessage::from_text(m, ErrorSource::Frame))
    }

    /// Pattern match on stderr, falling back to its first non-blank line.
    pub fn extract_from_stderr(&self, stderr: &str) -> Option<ErrorMessage> {
        if stderr.trim().is_empty() {
            return None;
        }
        if let Some(m) = last_match(stderr) {
            return Some(ErrorMessage::from_text(m, ErrorSource::Stderr));
        }
        let first_line = stderr.lines().map(str::trim).find(|l| !l.is_empty())?;
        Some(ErrorMessage::from_text(
            truncate_chars(first_line, MAX_SNIPPET_CHARS),
            ErrorSource::Stderr,
        ))
    }

    pub fn extract_from_exit_code(&self, exit_code: i32) -> ErrorMessage {
        ErrorMessage::from_text(&describe_exit_code(exit_code), ErrorSource::ExitCode)
    }
}

/// Human-readable cause for common exit codes.
pub fn describe_exit_code(exit_code: i32) -> String {
    match exit_code {
        1 => "Build failed with general error".to_string(),
        2 => "Build failed with configuration error".to_string(),
        124 => "Build timed out".to_string(),
        127 => "Command not found".to_string(),
        130 => "Build interrupted (SIGINT)".to_string(),
        137 => "Build killed (SIGKILL)".to_string(),
        255 => "Application error occurred".to_string(),
        code => format!("Build failed with exit code {}", code),
    }
}

/// Last match of the first pattern that matches anywhere in `text`.
fn last_match(text: &str) -> Option<&str> {
    patterns().iter().find_map(|re| {
        re.find_iter(text)
            .last()
            .map(|m| truncate_chars(m.as_str().trim(), MAX_SNIPPET_CHARS))
            .filter(|s| !s.is_empty())
    })
}
