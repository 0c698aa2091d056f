//! Series manifests and ordered patch application.
//!
//! A patches directory carries a quilt-style `series` manifest (one
//! artifact path per line, `#` comments) plus optional per-platform
//! overlays named `series.<platform>`. Application walks the combined
//! list in manifest order, trying a direct `git apply` and falling back
//! to a three-way merge, and never stops at a failed entry: failures are
//! collected and reported together at the end.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::git::{ApplyMode, GitTree};
use crate::model::patch::{is_deletion_marker, parse_deletion_marker};
use crate::model::types::Platform;

/// Name of the common series manifest.
pub const SERIES_FILE: &str = "series";

// ---------------------------------------------------------------------------
// Manifest parsing
// ---------------------------------------------------------------------------

/// Parse series manifest text into ordered entries.
///
/// A line is dropped when blank or when its first non-whitespace character
/// is `#`. An inline ` #` truncates the line from that point. Order is
/// preserved and duplicates are kept; an entry listed twice is applied
/// twice.
#[must_use]
pub fn parse_series(text: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.find(" #").map_or(line, |pos| &line[..pos]);
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        entries.push(line.to_owned());
    }
    entries
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Problems that make a patches directory unusable for application.
#[derive(Debug)]
pub enum SeriesError {
    /// The patches directory does not exist.
    MissingDir(PathBuf),
    /// The common `series` manifest is absent.
    MissingManifest(PathBuf),
    /// A manifest could not be read.
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying cause.
        source: std::io::Error,
    },
}

impl fmt::Display for SeriesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDir(path) => {
                write!(f, "patches directory {} does not exist", path.display())
            }
            Self::MissingManifest(path) => {
                write!(f, "series manifest {} does not exist", path.display())
            }
            Self::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SeriesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Load the ordered entry list for `platform`: the common manifest first,
/// then the platform overlay when present.
///
/// # Errors
/// Returns [`SeriesError`] when the directory or common manifest is
/// missing, or a manifest cannot be read.
pub fn series_entries(patches_dir: &Path, platform: Platform) -> Result<Vec<String>, SeriesError> {
    if !patches_dir.is_dir() {
        return Err(SeriesError::MissingDir(patches_dir.to_owned()));
    }
    let common = patches_dir.join(SERIES_FILE);
    if !common.is_file() {
        return Err(SeriesError::MissingManifest(common));
    }

    let read = |path: &Path| -> Result<String, SeriesError> {
        std::fs::read_to_string(path).map_err(|e| SeriesError::Read {
            path: path.to_owned(),
            source: e,
        })
    };

    let mut entries = parse_series(&read(&common)?);
    let overlay = patches_dir.join(format!("{SERIES_FILE}.{}", platform.suffix()));
    if overlay.is_file() {
        entries.extend(parse_series(&read(&overlay)?));
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// One series entry that could not be applied.
#[derive(Debug)]
pub struct FailedEntry {
    /// The manifest entry as written.
    pub entry: String,
    /// Why it failed (git diagnostic, read error, malformed marker).
    pub diagnostic: String,
}

/// Aggregate outcome of a series run.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Entries applied (or, in dry-run, verified) in order.
    pub applied: Vec<String>,
    /// Entries that failed, in order, with diagnostics.
    pub failed: Vec<FailedEntry>,
}

impl Outcome {
    /// Whether every entry succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply every entry of the series for `platform` onto `tree`.
///
/// Entries resolve relative to `patches_dir`. Deletion markers remove the
/// recorded file from the tree (an already-absent file is a success);
/// everything else goes through `git apply`, direct first and three-way on
/// rejection. With `dry_run` set, markers only check existence and diffs
/// run `git apply --check`; the tree is never mutated.
///
/// # Errors
/// Returns [`SeriesError`] for directory/manifest-level problems. Per-entry
/// failures land in the returned [`Outcome`].
pub fn apply_series(
    tree: &GitTree,
    patches_dir: &Path,
    platform: Platform,
    dry_run: bool,
) -> Result<Outcome, SeriesError> {
    let entries = series_entries(patches_dir, platform)?;
    let total = entries.len();
    let mut outcome = Outcome::default();

    for (i, entry) in entries.iter().enumerate() {
        let position = i + 1;
        info!(entry = %entry, "[{position}/{total}] applying");
        match apply_entry(tree, patches_dir, entry, dry_run) {
            Ok(()) => outcome.applied.push(entry.clone()),
            Err(diagnostic) => {
                warn!(entry = %entry, %diagnostic, "[{position}/{total}] failed");
                outcome.failed.push(FailedEntry {
                    entry: entry.clone(),
                    diagnostic,
                });
            }
        }
    }
    Ok(outcome)
}

/// Apply one entry; a per-entry failure is a diagnostic string, not an
/// error type, so the caller can keep walking the series.
fn apply_entry(
    tree: &GitTree,
    patches_dir: &Path,
    entry: &str,
    dry_run: bool,
) -> Result<(), String> {
    let artifact = patches_dir.join(entry);
    if !artifact.is_file() {
        return Err(format!("artifact {} does not exist", artifact.display()));
    }
    // git apply runs with the tree root as its working directory; hand it
    // an absolute artifact path so a relative patches dir still resolves.
    let artifact = std::path::absolute(&artifact)
        .map_err(|e| format!("failed to resolve {}: {e}", artifact.display()))?;

    // Raw bytes: artifacts can carry non-UTF-8 diff content.
    let content = std::fs::read(&artifact)
        .map_err(|e| format!("failed to read {}: {e}", artifact.display()))?;

    if is_deletion_marker(&content) {
        let target = parse_deletion_marker(&content).map_err(|e| e.to_string())?;
        let victim = tree.root().join(&target);
        if dry_run {
            info!(path = %target.display(), present = victim.exists(), "would delete");
            return Ok(());
        }
        if victim.exists() {
            std::fs::remove_file(&victim)
                .map_err(|e| format!("failed to delete {}: {e}", target.display()))?;
        }
        // Already-absent target: the tree is in the desired state.
        return Ok(());
    }

    if dry_run {
        let out = tree
            .apply(&artifact, ApplyMode::Check)
            .map_err(|e| e.to_string())?;
        return if out.ok { Ok(()) } else { Err(out.diagnostic) };
    }

    let direct = tree
        .apply(&artifact, ApplyMode::Direct)
        .map_err(|e| e.to_string())?;
    if direct.ok {
        return Ok(());
    }

    info!(entry = %entry, "direct apply rejected, retrying three-way");
    let merged = tree
        .apply(&artifact, ApplyMode::ThreeWay)
        .map_err(|e| e.to_string())?;
    if merged.ok {
        Ok(())
    } else {
        // Report the direct failure too; the three-way diagnostic alone
        // can be cryptic when the blob ancestry is missing.
        Err(format!(
            "direct apply: {}; three-way apply: {}",
            direct.diagnostic, merged.diagnostic
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
