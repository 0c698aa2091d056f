//! Feature classification index.
//!
//! The index maps feature names to the set of tree-relative files each
//! feature touches, plus a one-line description. It lives next to the
//! patch artifacts as a TOML document and is only ever mutated through
//! load → modify → atomic save, so a crash mid-write leaves the previous
//! revision intact.
//!
//! Updates merge: re-adding a feature unions its file set with the new
//! one and replaces the description. Nothing here ever removes a file
//! from a feature.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::types::{FeatureName, ValidationError};

/// Index document version written by this tool.
pub const INDEX_VERSION: &str = "1";

/// Description prefixes accepted when none are configured.
pub const DEFAULT_PREFIXES: [&str; 5] = ["feat:", "fix:", "refactor:", "chore:", "perf:"];

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// One feature's entry in the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// One-line prefixed description (`feat: ...`, `fix: ...`, ...).
    pub description: String,
    /// Tree-relative files attributed to the feature. The set keeps the
    /// persisted list sorted and free of duplicates.
    pub files: BTreeSet<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexDoc {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    features: BTreeMap<FeatureName, Feature>,
}

fn default_version() -> String {
    INDEX_VERSION.to_owned()
}

impl Default for IndexDoc {
    fn default() -> Self {
        Self {
            version: default_version(),
            features: BTreeMap::new(),
        }
    }
}

/// What a merge changed.
#[derive(Debug, PartialEq, Eq)]
pub struct MergeReport {
    /// Whether the feature was created by this merge.
    pub created: bool,
    /// Files newly attributed to the feature.
    pub added: usize,
    /// Files that were already attributed.
    pub already_present: usize,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from feature-index operations.
#[derive(Debug)]
pub enum FeatureError {
    /// The feature name failed validation.
    Name(ValidationError),
    /// The description does not start with an accepted prefix.
    DescriptionPrefix {
        /// The offending description.
        description: String,
        /// Accepted prefixes.
        prefixes: Vec<String>,
    },
    /// An update was requested with no files to attribute.
    EmptyChangeSet(FeatureName),
    /// The named feature is not in the index.
    NotFound {
        /// The requested name.
        name: FeatureName,
        /// Names that do exist, for the error message.
        available: Vec<String>,
    },
    /// Filesystem failure reading or writing the index.
    Io {
        /// Index path.
        path: PathBuf,
        /// Underlying cause.
        source: std::io::Error,
    },
    /// The index document is malformed.
    Parse {
        /// Index path.
        path: PathBuf,
        /// Parser message (includes position info).
        detail: String,
    },
    /// The index document could not be serialized (a file path that is
    /// not valid UTF-8 cannot be recorded in TOML).
    Serialize {
        /// Index path.
        path: PathBuf,
        /// Serializer message.
        detail: String,
    },
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(e) => write!(f, "{e}"),
            Self::DescriptionPrefix {
                description,
                prefixes,
            } => write!(
                f,
                "description {description:?} must start with one of: {}",
                prefixes.join(", ")
            ),
            Self::EmptyChangeSet(name) => {
                write!(f, "no files to attribute to feature {name}")
            }
            Self::NotFound { name, available } => {
                write!(f, "feature {name} not found")?;
                if !available.is_empty() {
                    write!(f, "; available: {}", available.join(", "))?;
                }
                Ok(())
            }
            Self::Io { path, source } => {
                write!(f, "feature index {}: {source}", path.display())
            }
            Self::Parse { path, detail } => {
                write!(f, "malformed feature index {}: {detail}", path.display())
            }
            Self::Serialize { path, detail } => {
                write!(f, "cannot serialize feature index {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for FeatureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Name(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ValidationError> for FeatureError {
    fn from(e: ValidationError) -> Self {
        Self::Name(e)
    }
}

// ---------------------------------------------------------------------------
// FeatureIndex
// ---------------------------------------------------------------------------

/// The loaded index plus the path it round-trips through.
#[derive(Debug)]
pub struct FeatureIndex {
    path: PathBuf,
    doc: IndexDoc,
}

impl FeatureIndex {
    /// Load the index at `path`. A missing file is an empty index, so the
    /// first `save` creates it.
    ///
    /// # Errors
    /// Returns [`FeatureError`] on read failure (other than absence) or a
    /// malformed document.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, FeatureError> {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|e| FeatureError::Parse {
                path: path.clone(),
                detail: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexDoc::default(),
            Err(e) => return Err(FeatureError::Io { path, source: e }),
        };
        Ok(Self { path, doc })
    }

    /// Persist the index atomically (temp file in the same directory,
    /// then rename).
    ///
    /// # Errors
    /// Returns [`FeatureError::Io`] on filesystem failure.
    pub fn save(&self) -> Result<(), FeatureError> {
        let io_err = |e: std::io::Error| FeatureError::Io {
            path: self.path.clone(),
            source: e,
        };

        // Serialize before touching the filesystem: a failure here (file
        // paths that are not valid UTF-8) must leave the on-disk document
        // untouched, never replace it with an empty one.
        let text =
            toml::to_string_pretty(&self.doc).map_err(|e| FeatureError::Serialize {
                path: self.path.clone(),
                detail: e.to_string(),
            })?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let dir = dir.unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(text.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Create or merge a feature entry.
    ///
    /// An existing feature gains the union of its files and `changed`, and
    /// its description is replaced. A new feature is created with exactly
    /// `changed`.
    ///
    /// # Errors
    /// Returns [`FeatureError`] for a bad description prefix or an empty
    /// change set.
    pub fn add_or_update(
        &mut self,
        name: &FeatureName,
        description: &str,
        changed: &BTreeSet<PathBuf>,
        prefixes: &[String],
    ) -> Result<MergeReport, FeatureError> {
        validate_description(description, prefixes)?;
        if changed.is_empty() {
            return Err(FeatureError::EmptyChangeSet(name.clone()));
        }

        let report = match self.doc.features.get_mut(name) {
            Some(feature) => {
                let before = feature.files.len();
                feature.files.extend(changed.iter().cloned());
                let added = feature.files.len() - before;
                feature.description = description.to_owned();
                MergeReport {
                    created: false,
                    added,
                    already_present: changed.len() - added,
                }
            }
            None => {
                self.doc.features.insert(
                    name.clone(),
                    Feature {
                        description: description.to_owned(),
                        files: changed.clone(),
                    },
                );
                MergeReport {
                    created: true,
                    added: changed.len(),
                    already_present: 0,
                }
            }
        };

        info!(
            feature = %name,
            created = report.created,
            added = report.added,
            already_present = report.already_present,
            "merged feature files"
        );
        Ok(report)
    }

    /// Attribute `files` to `name`. With a description the merge behaves
    /// like [`Self::add_or_update`]; without one the feature must already
    /// exist and keeps its current description.
    ///
    /// # Errors
    /// Returns [`FeatureError::NotFound`] for a missing feature with no
    /// description to create it from, plus the `add_or_update` failures.
    pub fn classify(
        &mut self,
        name: &FeatureName,
        files: &BTreeSet<PathBuf>,
        description: Option<&str>,
        prefixes: &[String],
    ) -> Result<MergeReport, FeatureError> {
        let description = match description {
            Some(d) => d.to_owned(),
            None => self.get(name)?.description.clone(),
        };
        self.add_or_update(name, &description, files, prefixes)
    }

    /// All features, in name order.
    #[must_use]
    pub fn list(&self) -> Vec<(&FeatureName, &Feature)> {
        self.doc.features.iter().collect()
    }

    /// Look up one feature.
    ///
    /// # Errors
    /// Returns [`FeatureError::NotFound`] carrying the available names.
    pub fn get(&self, name: &FeatureName) -> Result<&Feature, FeatureError> {
        self.doc.features.get(name).ok_or_else(|| FeatureError::NotFound {
            name: name.clone(),
            available: self.doc.features.keys().map(ToString::to_string).collect(),
        })
    }

    /// Files in `universe` not attributed to any feature, sorted.
    #[must_use]
    pub fn unclassified(&self, universe: &[PathBuf]) -> Vec<PathBuf> {
        let attributed: BTreeSet<&PathBuf> =
            self.doc.features.values().flat_map(|f| &f.files).collect();
        let mut rest: Vec<PathBuf> = universe
            .iter()
            .filter(|p| !attributed.contains(p))
            .cloned()
            .collect();
        rest.sort();
        rest.dedup();
        rest
    }
}

/// Check a description against the accepted prefix vocabulary.
///
/// # Errors
/// Returns [`FeatureError::DescriptionPrefix`] when no prefix matches or
/// nothing follows the prefix.
pub fn validate_description(description: &str, prefixes: &[String]) -> Result<(), FeatureError> {
    let ok = prefixes.iter().any(|prefix| {
        description
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| !rest.trim().is_empty())
    });
    if ok {
        Ok(())
    } else {
        Err(FeatureError::DescriptionPrefix {
            description: description.to_owned(),
            prefixes: prefixes.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
