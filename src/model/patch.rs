//! Patch representation and unified-diff parsing.
//!
//! A captured change to one tracked file is a [`FilePatch`]: the
//! tree-relative path plus an exhaustive [`FileChange`] variant. Binary
//! changes are rejected during parsing and have no representation here,
//! so every consumer of [`FileChange`] handles exactly Add, Modify,
//! Delete.
//!
//! This module also defines the on-disk deletion-marker format: a small
//! TOML document distinguishable from any unified diff by inspecting its
//! first line, written in place of a diff when a file must be removed at
//! series-application time.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FileChange / FilePatch
// ---------------------------------------------------------------------------

/// The change a patch artifact records for one file.
///
/// Diff content is raw bytes: git diffs any text file regardless of its
/// encoding, and round-trip fidelity requires the artifact to carry the
/// exact bytes git produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileChange {
    /// File does not exist at base; full-content diff against an empty
    /// baseline.
    Add {
        /// Unified-diff content.
        diff: Vec<u8>,
    },
    /// File exists at base and in the working tree with different content.
    Modify {
        /// Unified-diff content.
        diff: Vec<u8>,
    },
    /// File exists at base but not in the working tree. Carries no diff
    /// content by construction; persisted as a deletion marker.
    Delete,
}

/// A captured change to a single tracked file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePatch {
    /// Tree-relative path of the changed file.
    pub path: PathBuf,
    /// What changed.
    pub change: FileChange,
}

impl FilePatch {
    /// The unified-diff content, or `None` for a deletion.
    #[must_use]
    pub fn diff_content(&self) -> Option<&[u8]> {
        match &self.change {
            FileChange::Add { diff } | FileChange::Modify { diff } => Some(diff),
            FileChange::Delete => None,
        }
    }

    /// Whether this patch records a deletion.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.change, FileChange::Delete)
    }
}

// ---------------------------------------------------------------------------
// Diff splitting
// ---------------------------------------------------------------------------

/// Operation recorded by one per-file record of a raw diff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffOp {
    /// `new file mode` header present.
    Add,
    /// Neither creation nor deletion header present.
    Modify,
    /// `deleted file mode` header present.
    Delete,
}

/// One per-file record split out of raw `git diff` output.
///
/// Intermediate form: the extractor turns records into [`FilePatch`]es,
/// rejecting binary records along the way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffRecord {
    /// Tree-relative path the record applies to.
    pub path: PathBuf,
    /// Operation headers found in the record.
    pub op: DiffOp,
    /// Whether git flagged the content as binary.
    pub is_binary: bool,
    /// The record's full diff content, including its `diff --git` header.
    pub text: Vec<u8>,
}

/// Strip git's `a/` / `b/` prefix and surrounding quotes from a diff path.
fn clean_diff_path(raw: &str) -> &str {
    let raw = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    raw.strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw)
}

/// Split raw `git diff` output into per-file [`DiffRecord`]s.
///
/// Records begin at each `diff --git` header. The path is taken from the
/// `+++ b/<path>` line when present (falling back to `--- a/<path>` for
/// deletions, where `+++` is `/dev/null`). Binary content is detected from
/// git's `Binary files ... differ` / `GIT binary patch` markers.
///
/// Operates on bytes: header lines are ASCII (git quotes non-ASCII paths),
/// but content lines keep whatever encoding the file has.
#[must_use]
pub fn split_diff(raw: &[u8]) -> Vec<DiffRecord> {
    let mut records = Vec::new();
    let mut current: Option<RecordBuilder> = None;

    for line in byte_lines(raw) {
        if line.starts_with(b"diff --git ") {
            if let Some(builder) = current.take() {
                records.extend(builder.finish());
            }
            current = Some(RecordBuilder::new(line));
            continue;
        }
        if let Some(builder) = current.as_mut() {
            builder.push(line);
        }
    }
    if let Some(builder) = current.take() {
        records.extend(builder.finish());
    }
    records
}

/// Split on `\n`, dropping the empty tail a trailing newline produces.
fn byte_lines(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    (!raw.is_empty())
        .then(|| raw.split(|&b| b == b'\n'))
        .into_iter()
        .flatten()
}

/// A diff header line interpreted as text, when it is valid UTF-8.
fn header_str(line: &[u8]) -> Option<&str> {
    std::str::from_utf8(line).ok()
}

struct RecordBuilder {
    lines: Vec<Vec<u8>>,
    new_file: bool,
    deleted_file: bool,
    is_binary: bool,
    plus_path: Option<String>,
    minus_path: Option<String>,
}

impl RecordBuilder {
    fn new(header: &[u8]) -> Self {
        Self {
            lines: vec![header.to_vec()],
            new_file: false,
            deleted_file: false,
            is_binary: false,
            plus_path: None,
            minus_path: None,
        }
    }

    fn push(&mut self, line: &[u8]) {
        if line.starts_with(b"new file mode") {
            self.new_file = true;
        } else if line.starts_with(b"deleted file mode") {
            self.deleted_file = true;
        } else if (line.starts_with(b"Binary files ") && line.ends_with(b" differ"))
            || line.starts_with(b"GIT binary patch")
        {
            self.is_binary = true;
        } else if let Some(rest) = line.strip_prefix(b"+++ ") {
            // Only the header line counts; a hunk's added line starting
            // with "++ " would render the same prefix.
            if self.plus_path.is_none() && rest != b"/dev/null" {
                if let Some(rest) = header_str(rest) {
                    self.plus_path = Some(clean_diff_path(rest).to_owned());
                }
            }
        } else if let Some(rest) = line.strip_prefix(b"--- ") {
            if self.minus_path.is_none() && rest != b"/dev/null" {
                if let Some(rest) = header_str(rest) {
                    self.minus_path = Some(clean_diff_path(rest).to_owned());
                }
            }
        }
        self.lines.push(line.to_vec());
    }

    fn finish(mut self) -> Option<DiffRecord> {
        // Binary records have no ---/+++ lines; fall back to the
        // `diff --git a/<p> b/<p>` header for the path.
        let header_path = self
            .lines
            .first()
            .and_then(|h| header_str(h))
            .and_then(|h| h.rsplit(" b/").next())
            .map(|p| clean_diff_path(p).to_owned());
        let path = self
            .plus_path
            .take()
            .or_else(|| self.minus_path.take())
            .or(header_path)?;

        let op = if self.new_file {
            DiffOp::Add
        } else if self.deleted_file {
            DiffOp::Delete
        } else {
            DiffOp::Modify
        };

        let mut text = Vec::new();
        for line in &self.lines {
            text.extend_from_slice(line);
            text.push(b'\n');
        }

        Some(DiffRecord {
            path: PathBuf::from(path),
            op,
            is_binary: self.is_binary,
            text,
        })
    }
}

// ---------------------------------------------------------------------------
// Deletion marker
// ---------------------------------------------------------------------------

/// First line of every deletion-marker artifact. A unified diff can never
/// start with this line, so sniffing it is sufficient to route an artifact
/// away from `git apply`.
pub const DELETION_MARKER_HEADER: &str = "# patchforge deletion marker";

/// The body of a deletion marker.
#[derive(Debug, Serialize, Deserialize)]
struct MarkerDoc {
    op: String,
    path: PathBuf,
}

/// Errors rendering or parsing a deletion-marker artifact.
#[derive(Debug)]
pub enum MarkerError {
    /// The content does not begin with the marker header.
    NotAMarker,
    /// The TOML body could not be parsed.
    Parse(String),
    /// The body parsed but records an operation other than `delete`.
    WrongOp(String),
    /// The marker document could not be rendered (a source path that is
    /// not valid UTF-8 cannot be recorded in TOML).
    Encode(String),
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAMarker => write!(f, "not a deletion marker"),
            Self::Parse(detail) => write!(f, "malformed deletion marker: {detail}"),
            Self::WrongOp(op) => write!(f, "deletion marker has unexpected op {op:?}"),
            Self::Encode(detail) => write!(f, "cannot encode deletion marker: {detail}"),
        }
    }
}

impl std::error::Error for MarkerError {}

/// Whether `content` is a deletion marker, judged by its first non-blank
/// line alone.
#[must_use]
pub fn is_deletion_marker(content: &[u8]) -> bool {
    byte_lines(content)
        .map(<[u8]>::trim_ascii)
        .find(|l| !l.is_empty())
        .is_some_and(|l| l == DELETION_MARKER_HEADER.as_bytes())
}

/// Render the deletion-marker artifact for `path`.
///
/// # Errors
/// Returns [`MarkerError::Encode`] when `path` cannot be represented in
/// the marker document (not valid UTF-8).
pub fn render_deletion_marker(path: &Path) -> Result<String, MarkerError> {
    let doc = MarkerDoc {
        op: "delete".to_owned(),
        path: path.to_owned(),
    };
    let body = toml::to_string(&doc).map_err(|e| MarkerError::Encode(e.to_string()))?;
    Ok(format!("{DELETION_MARKER_HEADER}\n{body}"))
}

/// Parse a deletion marker, returning the tree-relative path to remove.
///
/// # Errors
/// Returns [`MarkerError`] if the content is not a marker, the body is
/// malformed, or the recorded op is not `delete`.
pub fn parse_deletion_marker(content: &[u8]) -> Result<PathBuf, MarkerError> {
    if !is_deletion_marker(content) {
        return Err(MarkerError::NotAMarker);
    }
    let text =
        std::str::from_utf8(content).map_err(|e| MarkerError::Parse(e.to_string()))?;
    let doc: MarkerDoc = toml::from_str(text).map_err(|e| {
        MarkerError::Parse(e.message().to_owned())
    })?;
    if doc.op != "delete" {
        return Err(MarkerError::WrongOp(doc.op));
    }
    Ok(doc.path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
