//! Patch artifact storage.
//!
//! [`PatchStore`] owns a patches root directory and mirrors the source
//! tree inside it: the change to `chrome/browser/foo.cc` is stored at
//! `<root>/chrome/browser/foo.cc.patch`. Writes are atomic (temp file in
//! the destination directory, then rename) so a crash never leaves a
//! half-written artifact in the series path.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::model::patch::{render_deletion_marker, FileChange, FilePatch};

// ---------------------------------------------------------------------------
// Confirm seam
// ---------------------------------------------------------------------------

/// Decides whether an existing artifact may be overwritten.
///
/// The CLI wires in an interactive prompt; tests and batch callers use
/// [`AlwaysConfirm`] / [`NeverConfirm`].
pub trait Confirm {
    /// Return `true` to allow overwriting the artifact at `artifact`.
    fn confirm_overwrite(&self, artifact: &Path) -> bool;
}

/// Approves every overwrite.
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm_overwrite(&self, _artifact: &Path) -> bool {
        true
    }
}

/// Declines every overwrite.
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm_overwrite(&self, _artifact: &Path) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors writing or enumerating patch artifacts.
#[derive(Debug)]
pub enum StoreError {
    /// The artifact exists and the caller declined to overwrite it.
    OverwriteDeclined(PathBuf),
    /// The artifact content could not be rendered (deletion marker for a
    /// non-UTF-8 source path).
    Encode {
        /// Tree-relative source path.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },
    /// Filesystem failure while writing an artifact.
    Write {
        /// Destination artifact path.
        path: PathBuf,
        /// Underlying cause.
        source: std::io::Error,
    },
    /// Failure enumerating stored artifacts.
    List(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverwriteDeclined(path) => {
                write!(f, "overwrite of {} declined", path.display())
            }
            Self::Encode { path, detail } => {
                write!(f, "cannot encode artifact for {}: {detail}", path.display())
            }
            Self::Write { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
            Self::List(e) => write!(f, "failed to enumerate patch artifacts: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Write { source, .. } => Some(source),
            Self::List(e) => Some(e),
            Self::OverwriteDeclined(_) | Self::Encode { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PatchStore
// ---------------------------------------------------------------------------

/// A directory of patch artifacts mirroring the source tree layout.
pub struct PatchStore {
    root: PathBuf,
}

impl PatchStore {
    /// Create a store rooted at `root`. The directory need not exist yet;
    /// it is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The patches root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact path for a tree-relative source path: the source path
    /// mirrored under the store root with `.patch` appended to the file
    /// name.
    #[must_use]
    pub fn artifact_path(&self, source: &Path) -> PathBuf {
        let mut name = source
            .file_name()
            .map_or_else(std::ffi::OsString::new, std::ffi::OsStr::to_os_string);
        name.push(".patch");
        match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                self.root.join(parent).join(name)
            }
            _ => self.root.join(name),
        }
    }

    /// Write artifact `content` for `source`.
    ///
    /// An existing artifact is only replaced when `force` is set or
    /// `confirm` approves; otherwise the write fails with
    /// [`StoreError::OverwriteDeclined`].
    ///
    /// # Errors
    /// Returns [`StoreError`] on declined overwrite or filesystem failure.
    pub fn write(
        &self,
        source: &Path,
        content: &[u8],
        force: bool,
        confirm: &dyn Confirm,
    ) -> Result<PathBuf, StoreError> {
        let artifact = self.artifact_path(source);
        if artifact.exists() && !force && !confirm.confirm_overwrite(&artifact) {
            return Err(StoreError::OverwriteDeclined(artifact));
        }

        let dir = artifact.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Write {
            path: artifact.clone(),
            source: e,
        })?;

        // Write-then-rename keeps readers from ever seeing a torn artifact.
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::Write {
            path: artifact.clone(),
            source: e,
        })?;
        tmp.write_all(content)
            .map_err(|e| StoreError::Write {
                path: artifact.clone(),
                source: e,
            })?;
        tmp.persist(&artifact).map_err(|e| StoreError::Write {
            path: artifact.clone(),
            source: e.error,
        })?;

        debug!(artifact = %artifact.display(), "wrote patch artifact");
        Ok(artifact)
    }

    /// Persist a [`FilePatch`]: diff content for adds and modifies, a
    /// deletion marker for deletions.
    ///
    /// # Errors
    /// Returns [`StoreError`] on declined overwrite or filesystem failure.
    pub fn write_patch(
        &self,
        patch: &FilePatch,
        force: bool,
        confirm: &dyn Confirm,
    ) -> Result<PathBuf, StoreError> {
        match &patch.change {
            FileChange::Add { diff } | FileChange::Modify { diff } => {
                self.write(&patch.path, diff, force, confirm)
            }
            FileChange::Delete => self.write_deletion_marker(&patch.path, force, confirm),
        }
    }

    /// Record that `source` must be removed at application time.
    ///
    /// # Errors
    /// Returns [`StoreError`] on declined overwrite or filesystem failure.
    pub fn write_deletion_marker(
        &self,
        source: &Path,
        force: bool,
        confirm: &dyn Confirm,
    ) -> Result<PathBuf, StoreError> {
        info!(path = %source.display(), "writing deletion marker");
        let marker = render_deletion_marker(source).map_err(|e| StoreError::Encode {
            path: source.to_owned(),
            detail: e.to_string(),
        })?;
        self.write(source, marker.as_bytes(), force, confirm)
    }

    /// All source paths with a stored artifact, sorted, tree-relative
    /// (the `.patch` suffix stripped back off).
    ///
    /// # Errors
    /// Returns [`StoreError::List`] if the store cannot be walked.
    pub fn source_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut sources = Vec::new();
        if !self.root.exists() {
            return Ok(sources);
        }

        let pattern = format!("{}/**/*.patch", self.root.display());
        let entries = glob::glob(&pattern).map_err(|e| {
            StoreError::List(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        for entry in entries {
            let artifact = entry.map_err(|e| StoreError::List(e.into_error()))?;
            let Ok(relative) = artifact.strip_prefix(&self.root) else {
                continue;
            };
            let Some(stem) = relative.to_string_lossy().strip_suffix(".patch").map(PathBuf::from)
            else {
                continue;
            };
            sources.push(stem);
        }
        sources.sort();
        Ok(sources)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
