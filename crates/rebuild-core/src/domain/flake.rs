//! Flake references and the rebuild action they are applied with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{RebuildError, Result};

/// Characters that would let a flake reference escape its argument slot in
/// the shell command line.
const FORBIDDEN_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '<', '>', '(', ')', '\'', '"', '\\',
];

/// A validated flake reference such as `.#` or `/etc/nixos#myhost`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlakeRef(String);

impl FlakeRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| RebuildError::InvalidFlakeRef {
            flake_ref: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(invalid("must not contain whitespace"));
        }
        if let Some(c) = raw.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            return Err(invalid(&format!("must not contain {:?}", c)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FlakeRef {
    fn default() -> Self {
        Self(".#".to_string())
    }
}

impl fmt::Display for FlakeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FlakeRef {
    type Err = RebuildError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FlakeRef {
    type Error = RebuildError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FlakeRef> for String {
    fn from(value: FlakeRef) -> Self {
        value.0
    }
}

/// `nixos-rebuild` sub-command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildAction {
    #[default]
    Test,
    Build,
    DryBuild,
    DryActivate,
}

impl RebuildAction {
    pub const ALL: [RebuildAction; 4] = [
        RebuildAction::Test,
        RebuildAction::Build,
        RebuildAction::DryBuild,
        RebuildAction::DryActivate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RebuildAction::Test => "test",
            RebuildAction::Build => "build",
            RebuildAction::DryBuild => "dry-build",
            RebuildAction::DryActivate => "dry-activate",
        }
    }
}

impl fmt::Display for RebuildAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebuildAction {
    type Err = RebuildError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                RebuildError::InvalidConfig(format!(
                    "unknown action {:?}, expected one of test, build, dry-build, dry-activate",
                    s
                ))
            })
    }
}
