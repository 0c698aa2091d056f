//! Diff extraction against a base commit.
//!
//! Given a tree-relative path and a base commit, [`extract`] captures the
//! working-tree change to that file as a [`FilePatch`]. The interesting
//! work is disambiguating an *empty* `git diff`: the same empty output
//! covers a file that never existed, a file with no changes, a file
//! deleted from the tree, and a file git does not yet track. Each case is
//! resolved by probing the base tree and the working tree separately.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::git::{GitError, GitTree};
use crate::model::patch::{split_diff, DiffOp, FileChange, FilePatch};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors extracting a single file's patch.
#[derive(Debug)]
pub enum ExtractError {
    /// The base reference does not resolve to a commit.
    BaseCommitMissing(String),
    /// The path exists neither at base nor in the working tree.
    NotFound(PathBuf),
    /// The path is identical at base and in the working tree.
    NoChanges(PathBuf),
    /// The change is binary; binary patches are not supported.
    UnsupportedBinary(PathBuf),
    /// A single-path diff unexpectedly produced records for several files.
    AmbiguousDiff {
        /// The requested path.
        path: PathBuf,
        /// How many per-file records the diff contained.
        count: usize,
    },
    /// Diff output was non-empty but yielded no parseable record.
    MalformedDiff(PathBuf),
    /// The underlying git invocation failed.
    Git(GitError),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BaseCommitMissing(base) => {
                write!(f, "base commit {base:?} not found in tree")
            }
            Self::NotFound(path) => write!(
                f,
                "{} exists neither at base nor in the working tree",
                path.display()
            ),
            Self::NoChanges(path) => {
                write!(f, "{} has no changes against base", path.display())
            }
            Self::UnsupportedBinary(path) => {
                write!(f, "{} is a binary change; only text diffs are supported", path.display())
            }
            Self::AmbiguousDiff { path, count } => write!(
                f,
                "diff for {} produced {count} file records, expected exactly one",
                path.display()
            ),
            Self::MalformedDiff(path) => {
                write!(f, "could not parse diff output for {}", path.display())
            }
            Self::Git(e) => write!(f, "git failure: {e}"),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Git(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GitError> for ExtractError {
    fn from(e: GitError) -> Self {
        Self::Git(e)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Capture the working-tree change to `path` relative to `base`.
///
/// # Errors
/// Returns [`ExtractError`] when the base commit is missing, the path has
/// no change to capture, the change is binary or ambiguous, or git fails.
pub fn extract(tree: &GitTree, path: &Path, base: &str) -> Result<FilePatch, ExtractError> {
    if !tree.commit_exists(base) {
        return Err(ExtractError::BaseCommitMissing(base.to_owned()));
    }

    let raw = tree.diff(base, path)?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        return extract_from_empty_diff(tree, path, base);
    }

    let records = split_diff(&raw);
    match records.len() {
        0 => Err(ExtractError::MalformedDiff(path.to_owned())),
        1 => {
            let record = &records[0];
            if record.is_binary {
                return Err(ExtractError::UnsupportedBinary(path.to_owned()));
            }
            let change = match record.op {
                DiffOp::Add => FileChange::Add {
                    diff: record.text.clone(),
                },
                DiffOp::Modify => FileChange::Modify {
                    diff: record.text.clone(),
                },
                DiffOp::Delete => FileChange::Delete,
            };
            debug!(path = %path.display(), op = ?record.op, "extracted diff");
            Ok(FilePatch {
                path: path.to_owned(),
                change,
            })
        }
        count => Err(ExtractError::AmbiguousDiff {
            path: path.to_owned(),
            count,
        }),
    }
}

/// Resolve the four cases an empty diff can mean.
fn extract_from_empty_diff(
    tree: &GitTree,
    path: &Path,
    base: &str,
) -> Result<FilePatch, ExtractError> {
    let at_base = tree.path_exists_at(base, path);
    let in_tree = tree.path_exists_in_tree(path);

    match (at_base, in_tree) {
        (false, false) => Err(ExtractError::NotFound(path.to_owned())),
        (true, true) => Err(ExtractError::NoChanges(path.to_owned())),
        (true, false) => {
            info!(path = %path.display(), "file removed relative to base, recording deletion");
            Ok(FilePatch {
                path: path.to_owned(),
                change: FileChange::Delete,
            })
        }
        (false, true) => {
            // Untracked new file: regular diff sees nothing, so synthesize
            // the creation diff against an empty baseline.
            let raw = tree.diff_against_empty(path)?;
            let records = split_diff(&raw);
            let record = records
                .first()
                .ok_or_else(|| ExtractError::MalformedDiff(path.to_owned()))?;
            if record.is_binary {
                return Err(ExtractError::UnsupportedBinary(path.to_owned()));
            }
            debug!(path = %path.display(), "synthesized new-file diff");
            Ok(FilePatch {
                path: path.to_owned(),
                change: FileChange::Add {
                    diff: record.text.clone(),
                },
            })
        }
    }
}

/// Extract patches for several paths, continuing past per-path failures.
///
/// Returns the successfully extracted patches in request order alongside
/// the paths that failed, each paired with its error.
///
/// # Errors
/// Fails up front with [`ExtractError::BaseCommitMissing`] if the base
/// reference does not resolve; every other failure is per-path data.
pub fn extract_many(
    tree: &GitTree,
    paths: &[PathBuf],
    base: &str,
) -> Result<(Vec<FilePatch>, Vec<(PathBuf, ExtractError)>), ExtractError> {
    if !tree.commit_exists(base) {
        return Err(ExtractError::BaseCommitMissing(base.to_owned()));
    }

    let mut patches = Vec::new();
    let mut failures = Vec::new();
    for path in paths {
        match extract(tree, path, base) {
            Ok(patch) => patches.push(patch),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "extraction failed");
                failures.push((path.clone(), e));
            }
        }
    }
    Ok((patches, failures))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
