//! Blocking git process collaborator.
//!
//! [`GitTree`] wraps the handful of git operations the patch engine needs:
//! computing diffs against a base commit, listing the files a commit
//! touched, and applying patch artifacts. All invocations are blocking
//! `std::process::Command` calls with captured output; no timeout is
//! enforced at this layer.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from invoking git.
#[derive(Debug)]
pub enum GitError {
    /// A git command exited non-zero where success was required.
    Command {
        /// The full command string (for diagnostics).
        command: String,
        /// Captured stderr from git.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },
    /// An I/O error (e.g. spawning git).
    Io(std::io::Error),
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Command { .. } => None,
        }
    }
}

impl From<std::io::Error> for GitError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// ApplyMode / ApplyOutput
// ---------------------------------------------------------------------------

/// How a patch artifact should be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyMode {
    /// Check-only: report whether the patch would apply, mutate nothing.
    Check,
    /// Direct application.
    Direct,
    /// Three-way merge application (uses blob ancestry to resolve context
    /// mismatches a direct apply would reject).
    ThreeWay,
}

/// Result of one `git apply` attempt.
///
/// Per-entry apply failure is data, not an error: the series applier
/// aggregates these and keeps going.
#[derive(Debug)]
pub struct ApplyOutput {
    /// Whether git accepted the patch.
    pub ok: bool,
    /// Combined stderr/stdout from git (empty on success).
    pub diagnostic: String,
}

// ---------------------------------------------------------------------------
// GitTree
// ---------------------------------------------------------------------------

/// A git working tree rooted at a fixed directory.
pub struct GitTree {
    root: PathBuf,
}

impl GitTree {
    /// Create a `GitTree` rooted at `root` (the upstream checkout).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The working-tree root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a git command in the tree root and return its raw stdout.
    ///
    /// Diff content must stay bytes: git happily diffs text files whose
    /// encoding is not UTF-8, and a lossy decode here would corrupt the
    /// captured artifact. Only diagnostics are decoded lossily.
    fn git_stdout(&self, args: &[&str]) -> Result<Vec<u8>, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(GitError::Io)?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(GitError::Command {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                exit_code: output.status.code(),
            })
        }
    }

    /// Run a git command where a non-zero exit is an expected outcome, not
    /// an error. Returns `(success, raw stdout, stderr)`.
    fn git_status(&self, args: &[&str]) -> Result<(bool, Vec<u8>, String), GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(GitError::Io)?;
        Ok((
            output.status.success(),
            output.stdout,
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    /// Whether `reference` resolves to a commit in this tree.
    #[must_use]
    pub fn commit_exists(&self, reference: &str) -> bool {
        let spec = format!("{reference}^{{commit}}");
        self.git_status(&["cat-file", "-e", &spec])
            .is_ok_and(|(ok, _, _)| ok)
    }

    /// Whether `path` exists in the tree of `base`.
    #[must_use]
    pub fn path_exists_at(&self, base: &str, path: &Path) -> bool {
        let spec = format!("{base}:{}", path.display());
        self.git_status(&["cat-file", "-e", &spec])
            .is_ok_and(|(ok, _, _)| ok)
    }

    /// Whether `path` exists in the working tree.
    #[must_use]
    pub fn path_exists_in_tree(&self, path: &Path) -> bool {
        self.root.join(path).exists()
    }

    /// Diff `path` between `base` and the current working tree (including
    /// unstaged changes). Returned as raw bytes; empty output means no
    /// textual change.
    ///
    /// # Errors
    /// Returns [`GitError`] if the diff command itself fails (bad ref,
    /// spawn failure).
    pub fn diff(&self, base: &str, path: &Path) -> Result<Vec<u8>, GitError> {
        let path_str = path.to_string_lossy();
        self.git_stdout(&["diff", base, "--", &path_str])
    }

    /// Synthesize a full-content diff for a file that exists only in the
    /// working tree, by diffing against `/dev/null`.
    ///
    /// `git diff --no-index` exits 1 when the inputs differ, which is the
    /// expected case here.
    ///
    /// # Errors
    /// Returns [`GitError`] on spawn failure or an exit code other than 0/1.
    pub fn diff_against_empty(&self, path: &Path) -> Result<Vec<u8>, GitError> {
        let path_str = path.to_string_lossy().into_owned();
        let args = ["diff", "--no-index", "--", "/dev/null", &path_str];
        let (ok, stdout, stderr) = self.git_status(&args)?;
        if ok || !stdout.is_empty() {
            Ok(stdout)
        } else {
            Err(GitError::Command {
                command: format!("git {}", args.join(" ")),
                stderr: stderr.trim().to_owned(),
                exit_code: None,
            })
        }
    }

    /// The set of tree-relative paths changed by `commit`.
    ///
    /// # Errors
    /// Returns [`GitError`] if the commit cannot be resolved.
    pub fn changed_files(&self, commit: &str) -> Result<BTreeSet<PathBuf>, GitError> {
        let out = self.git_stdout(&["diff-tree", "--no-commit-id", "--name-only", "-r", commit])?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Apply a patch artifact onto the working tree.
    ///
    /// All modes ignore incidental whitespace differences and strip one
    /// leading path component (`-p1`), matching how the artifacts are
    /// written.
    ///
    /// # Errors
    /// Returns [`GitError`] only when git could not be invoked; a rejected
    /// patch is reported through [`ApplyOutput`].
    pub fn apply(&self, artifact: &Path, mode: ApplyMode) -> Result<ApplyOutput, GitError> {
        let artifact_str = artifact.to_string_lossy().into_owned();
        let mut args = vec!["apply", "--ignore-whitespace", "--whitespace=nowarn", "-p1"];
        match mode {
            ApplyMode::Check => args.push("--check"),
            ApplyMode::ThreeWay => args.push("--3way"),
            ApplyMode::Direct => {}
        }
        args.push(artifact_str.as_str());

        let (ok, stdout, stderr) = self.git_status(&args)?;
        let diagnostic = if ok {
            String::new()
        } else if stderr.trim().is_empty() {
            String::from_utf8_lossy(&stdout).trim().to_owned()
        } else {
            stderr.trim().to_owned()
        };
        Ok(ApplyOutput { ok, diagnostic })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Set up a fresh git repo with one committed file.
    fn setup_repo() -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.name", "Test"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            let out = Command::new("git")
                .args(&args)
                .current_dir(root)
                .output()
                .unwrap();
            assert!(out.status.success(), "git {args:?} failed");
        }
        fs::write(root.join("base.txt"), "line one\nline two\n").unwrap();
        run_git(root, &["add", "."]);
        run_git(root, &["commit", "-m", "base"]);
        let oid = run_git(root, &["rev-parse", "HEAD"]);
        (dir, oid)
    }

    fn run_git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("git must be installed");
        assert!(
            out.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_owned()
    }

    #[test]
    fn commit_exists_true_for_head() {
        let (dir, oid) = setup_repo();
        let tree = GitTree::new(dir.path());
        assert!(tree.commit_exists(&oid));
        assert!(tree.commit_exists("HEAD"));
    }

    #[test]
    fn commit_exists_false_for_garbage() {
        let (dir, _oid) = setup_repo();
        let tree = GitTree::new(dir.path());
        assert!(!tree.commit_exists("no-such-ref"));
    }

    #[test]
    fn path_exists_at_base() {
        let (dir, oid) = setup_repo();
        let tree = GitTree::new(dir.path());
        assert!(tree.path_exists_at(&oid, Path::new("base.txt")));
        assert!(!tree.path_exists_at(&oid, Path::new("missing.txt")));
    }

    #[test]
    fn diff_empty_when_unchanged() {
        let (dir, oid) = setup_repo();
        let tree = GitTree::new(dir.path());
        let diff = tree.diff(&oid, Path::new("base.txt")).unwrap();
        assert!(diff.is_empty(), "unexpected diff: {diff:?}");
    }

    #[test]
    fn diff_nonempty_after_edit() {
        let (dir, oid) = setup_repo();
        fs::write(dir.path().join("base.txt"), "line one\nline 2\n").unwrap();
        let tree = GitTree::new(dir.path());
        let raw = tree.diff(&oid, Path::new("base.txt")).unwrap();
        let diff = String::from_utf8(raw).unwrap();
        assert!(diff.contains("-line two"), "diff: {diff}");
        assert!(diff.contains("+line 2"), "diff: {diff}");
    }

    #[test]
    fn diff_keeps_non_utf8_bytes_raw() {
        let (dir, oid) = setup_repo();
        // Latin-1 "café" is text to git but not valid UTF-8.
        fs::write(dir.path().join("base.txt"), b"line one\ncaf\xe9\n").unwrap();
        let tree = GitTree::new(dir.path());
        let diff = tree.diff(&oid, Path::new("base.txt")).unwrap();
        assert!(
            diff.windows(4).any(|w| w == b"caf\xe9"),
            "raw byte lost: {diff:?}"
        );
        let replacement = "\u{FFFD}".as_bytes();
        assert!(
            !diff.windows(replacement.len()).any(|w| w == replacement),
            "diff was lossily decoded: {diff:?}"
        );
    }

    #[test]
    fn diff_against_empty_synthesizes_add() {
        let (dir, _oid) = setup_repo();
        fs::write(dir.path().join("new.txt"), "fresh content\n").unwrap();
        let tree = GitTree::new(dir.path());
        let raw = tree.diff_against_empty(Path::new("new.txt")).unwrap();
        let diff = String::from_utf8(raw).unwrap();
        assert!(diff.contains("+fresh content"), "diff: {diff}");
        assert!(diff.contains("/dev/null"), "diff: {diff}");
    }

    #[test]
    fn changed_files_lists_commit_paths() {
        let (dir, _oid) = setup_repo();
        let root = dir.path();
        fs::write(root.join("a.txt"), "a\n").unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub/b.txt"), "b\n").unwrap();
        run_git(root, &["add", "."]);
        run_git(root, &["commit", "-m", "two files"]);
        let commit = run_git(root, &["rev-parse", "HEAD"]);

        let tree = GitTree::new(root);
        let changed = tree.changed_files(&commit).unwrap();
        assert_eq!(
            changed,
            BTreeSet::from([PathBuf::from("a.txt"), PathBuf::from("sub/b.txt")])
        );
    }

    #[test]
    fn changed_files_unknown_commit_is_error() {
        let (dir, _oid) = setup_repo();
        let tree = GitTree::new(dir.path());
        let err = tree.changed_files("deadbeef").unwrap_err();
        assert!(matches!(err, GitError::Command { .. }), "got {err}");
    }

    #[test]
    fn apply_check_does_not_mutate() {
        let (dir, oid) = setup_repo();
        let root = dir.path();

        // Produce a patch, then reset the tree.
        fs::write(root.join("base.txt"), "line one\nline 2\n").unwrap();
        let tree = GitTree::new(root);
        let diff = tree.diff(&oid, Path::new("base.txt")).unwrap();
        run_git(root, &["checkout", "--", "base.txt"]);

        let patch_path = root.join("edit.patch");
        fs::write(&patch_path, diff).unwrap();

        let out = tree.apply(&patch_path, ApplyMode::Check).unwrap();
        assert!(out.ok, "check should pass: {}", out.diagnostic);
        let content = fs::read_to_string(root.join("base.txt")).unwrap();
        assert_eq!(content, "line one\nline two\n", "check must not mutate");
    }

    #[test]
    fn apply_direct_mutates() {
        let (dir, oid) = setup_repo();
        let root = dir.path();

        fs::write(root.join("base.txt"), "line one\nline 2\n").unwrap();
        let tree = GitTree::new(root);
        let diff = tree.diff(&oid, Path::new("base.txt")).unwrap();
        run_git(root, &["checkout", "--", "base.txt"]);

        let patch_path = root.join("edit.patch");
        fs::write(&patch_path, diff).unwrap();

        let out = tree.apply(&patch_path, ApplyMode::Direct).unwrap();
        assert!(out.ok, "apply failed: {}", out.diagnostic);
        let content = fs::read_to_string(root.join("base.txt")).unwrap();
        assert_eq!(content, "line one\nline 2\n");
    }

    #[test]
    fn apply_failure_carries_diagnostic() {
        let (dir, _oid) = setup_repo();
        let root = dir.path();
        let patch_path = root.join("bogus.patch");
        fs::write(
            &patch_path,
            "--- a/base.txt\n+++ b/base.txt\n@@ -1,1 +1,1 @@\n-no such line\n+other\n",
        )
        .unwrap();

        let tree = GitTree::new(root);
        let out = tree.apply(&patch_path, ApplyMode::Direct).unwrap();
        assert!(!out.ok);
        assert!(!out.diagnostic.is_empty(), "diagnostic should be captured");
    }

    #[test]
    fn git_error_display() {
        let err = GitError::Command {
            command: "git apply x.patch".to_owned(),
            stderr: "error: patch failed".to_owned(),
            exit_code: Some(1),
        };
        let msg = format!("{err}");
        assert!(msg.contains("git apply x.patch"));
        assert!(msg.contains("exit 1"));
        assert!(msg.contains("patch failed"));
    }
}
