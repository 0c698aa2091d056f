//! Core types for patchforge.
//!
//! Foundation types used throughout the engine: feature names, the closed
//! set of series platforms, and validation errors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which kind of value failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A feature name.
    FeatureName,
    /// A platform identifier.
    Platform,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeatureName => write!(f, "feature name"),
            Self::Platform => write!(f, "platform"),
        }
    }
}

/// A value failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The offending value.
    pub value: String,
    /// Why the value is invalid.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}': {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// FeatureName
// ---------------------------------------------------------------------------

/// A validated feature identifier.
///
/// Feature names must be lowercase alphanumeric with hyphens, 1–64
/// characters. Examples: `llm-chat`, `adblock`, `side-panel-2`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureName(String);

impl FeatureName {
    /// The maximum length of a feature name.
    pub const MAX_LEN: usize = 64;

    /// Create a new `FeatureName` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the name is empty, too long, or contains invalid
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the feature name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::FeatureName,
                value: s.to_owned(),
                reason: "feature name must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::FeatureName,
                value: s.to_owned(),
                reason: format!(
                    "feature name must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError {
                kind: ErrorKind::FeatureName,
                value: s.to_owned(),
                reason:
                    "feature name must contain only lowercase letters (a-z), digits (0-9), and hyphens (-)"
                        .to_owned(),
            });
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(ValidationError {
                kind: ErrorKind::FeatureName,
                value: s.to_owned(),
                reason: "feature name must not start or end with a hyphen".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FeatureName {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FeatureName {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<FeatureName> for String {
    fn from(name: FeatureName) -> Self {
        name.0
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The closed set of platforms a series manifest can target.
///
/// The lowercase name doubles as the manifest suffix: the platform-specific
/// manifest for Linux is `series.linux`, and so on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux builds (`series.linux`).
    Linux,
    /// macOS builds (`series.macos`).
    Macos,
    /// Windows builds (`series.windows`).
    Windows,
}

impl Platform {
    /// The platform of the running host.
    ///
    /// Any other unix-like OS falls back to `Linux`; the fork only ships
    /// the three platforms above.
    #[must_use]
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Macos,
            "windows" => Self::Windows,
            _ => Self::Linux,
        }
    }

    /// The manifest suffix for this platform (same as the display name).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::Macos),
            "windows" => Ok(Self::Windows),
            _ => Err(ValidationError {
                kind: ErrorKind::Platform,
                value: s.to_owned(),
                reason: "expected one of: linux, macos, windows".to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
