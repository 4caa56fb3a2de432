//! Tester configuration: recording, rebuild and output settings.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional TOML file and CLI flags applied by the binary.
//!
//! ```toml
//! [recording]
//! enabled = true
//! width = 120
//! height = 40
//! export_gif = false
//! export_screenshot = true
//!
//! [rebuild]
//! action = "dry-build"
//! flake_ref = "/etc/nixos#myhost"
//! timeout_secs = 3600
//! capture_interval_secs = 2.5
//! use_sudo = true
//!
//! [output]
//! base_dir = "/var/log/rebuild-tester"
//! keep_last_n = 10
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{RebuildConfig, RebuildError, Result, TerminalDimensions};

/// Terminal recording and derived artifact settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub width: u16,
    pub height: u16,
    pub export_gif: bool,
    pub export_screenshot: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 120,
            height: 40,
            export_gif: false,
            export_screenshot: true,
        }
    }
}

impl RecordingConfig {
    /// Validated terminal size.
    pub fn dimensions(&self) -> Result<TerminalDimensions> {
        TerminalDimensions::new(self.width, self.height)
    }
}

/// Where build directories live and how many are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub base_dir: PathBuf,
    /// `None` keeps every build.
    pub keep_last_n: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./rebuild-logs"),
            keep_last_n: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recording: RecordingConfig,
    pub rebuild: RebuildConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| RebuildError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RebuildError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.recording.dimensions()?;
        self.rebuild.validate()?;
        if self.output.keep_last_n == Some(0) {
            return Err(RebuildError::InvalidConfig(
                "keep_last_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RebuildAction;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.recording.enabled);
        assert!(config.recording.export_screenshot);
        assert!(!config.recording.export_gif);
        assert_eq!(config.rebuild.action, RebuildAction::Test);
        assert_eq!(config.rebuild.flake_ref.as_str(), ".#");
        assert_eq!(config.output.base_dir, PathBuf::from("./rebuild-logs"));
        assert_eq!(config.output.keep_last_n, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [rebuild]
            action = "dry-build"
            flake_ref = "/etc/nixos#host"

            [output]
            keep_last_n = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.rebuild.action, RebuildAction::DryBuild);
        assert_eq!(config.rebuild.timeout_secs, 1800);
        assert_eq!(config.output.keep_last_n, Some(5));
        assert_eq!(config.recording.width, 120);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml_str("[recording]\nwidth = 10").is_err());
        assert!(Config::from_toml_str("[rebuild]\ntimeout_secs = 30").is_err());
        assert!(Config::from_toml_str("[output]\nkeep_last_n = 0").is_err());
        assert!(Config::from_toml_str("[rebuild]\nflake_ref = \".#a;b\"").is_err());
        assert!(Config::from_toml_str("[rebuild]\naction = \"switch\"").is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tester.toml");
        std::fs::write(&path, "[recording]\nenabled = false\n").unwrap();
        let config = Config::from_toml_file(&path).unwrap();
        assert!(!config.recording.enabled);

        assert!(Config::from_toml_file(&dir.path().join("missing.toml")).is_err());
    }
}
