//! Shared fixtures: real temporary git repositories.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Create a git repo with two committed files and return it with the base
/// commit id.
///
/// Layout:
///   greeting.txt      "hello\nworld\n"
///   nested/config.h   "#define LEVEL 1\n"
pub fn setup_tree() -> (TempDir, String) {
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

    fs::write(root.join("greeting.txt"), "hello\nworld\n").unwrap();
    fs::create_dir_all(root.join("nested")).unwrap();
    fs::write(root.join("nested/config.h"), "#define LEVEL 1\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-m", "base"]);
    let oid = run_git(root, &["rev-parse", "HEAD"]);
    (dir, oid)
}

/// Run a git command in `dir`, asserting success, returning trimmed stdout.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
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

/// Discard all working-tree edits, back to HEAD.
pub fn reset_tree(dir: &Path) {
    run_git(dir, &["checkout", "--", "."]);
    run_git(dir, &["clean", "-fd"]);
}
