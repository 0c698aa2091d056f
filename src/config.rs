//! Typed configuration from `patchforge.toml`.
//!
//! Every field has a default, a missing file is the default configuration,
//! and unknown keys are rejected so a typo never silently falls back.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::feature::DEFAULT_PREFIXES;
use crate::model::types::Platform;

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "patchforge.toml";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Filesystem failure reading the file.
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying cause.
        source: std::io::Error,
    },
    /// The file is not valid configuration. The detail carries the toml
    /// parser's position information.
    Parse {
        /// Config path.
        path: PathBuf,
        /// Parser message.
        detail: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            Self::Parse { path, detail } => {
                write!(f, "invalid config {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct TreeSection {
    root: PathBuf,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("chromium/src"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct PatchesSection {
    dir: PathBuf,
}

impl Default for PatchesSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("patches"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct FeaturesSection {
    file: PathBuf,
    prefixes: Vec<String>,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            file: PathBuf::from("features.toml"),
            prefixes: DEFAULT_PREFIXES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct PlatformSection {
    series: Option<Platform>,
}

/// The full `patchforge.toml` configuration.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ForgeConfig {
    tree: TreeSection,
    patches: PatchesSection,
    features: FeaturesSection,
    platform: PlatformSection,
}

impl ForgeConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for unreadable or malformed files.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_owned(),
                source: e,
            }),
        }
    }

    /// Parse configuration text.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] with the parser's line/column detail.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            detail: e.to_string(),
        })
    }

    /// The working-tree root.
    #[must_use]
    pub fn tree_root(&self) -> &Path {
        &self.tree.root
    }

    /// The patches root (artifacts and series manifests).
    #[must_use]
    pub fn patches_dir(&self) -> &Path {
        &self.patches.dir
    }

    /// The feature index path, resolved relative to the patches dir unless
    /// configured absolute.
    #[must_use]
    pub fn features_file(&self) -> PathBuf {
        if self.features.file.is_absolute() {
            self.features.file.clone()
        } else {
            self.patches.dir.join(&self.features.file)
        }
    }

    /// Accepted feature-description prefixes.
    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.features.prefixes
    }

    /// The platform whose series to apply: the configured override, or the
    /// running host's.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform.series.unwrap_or_else(Platform::current)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
