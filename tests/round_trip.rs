//! Extract → store → apply fidelity over real git repositories.

mod common;

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use patchforge::extract::extract;
use patchforge::git::GitTree;
use patchforge::model::patch::{is_deletion_marker, FileChange};
use patchforge::model::types::Platform;
use patchforge::series::apply_series;
use patchforge::store::{NeverConfirm, PatchStore};

use common::{reset_tree, run_git, setup_tree};

/// Extract an edit, reset the tree, apply the stored series, and expect
/// byte-identical content.
#[test]
fn modify_round_trip_is_byte_identical() {
    let (tree_dir, base) = setup_tree();
    let root = tree_dir.path();
    let edited = "hello\nbrave new world\n";
    fs::write(root.join("greeting.txt"), edited).unwrap();

    let tree = GitTree::new(root);
    let patch = extract(&tree, Path::new("greeting.txt"), &base).unwrap();
    assert!(matches!(patch.change, FileChange::Modify { .. }));

    let patches_dir = TempDir::new().unwrap();
    let store = PatchStore::new(patches_dir.path());
    store.write_patch(&patch, false, &NeverConfirm).unwrap();
    fs::write(patches_dir.path().join("series"), "greeting.txt.patch\n").unwrap();

    reset_tree(root);
    assert_eq!(
        fs::read_to_string(root.join("greeting.txt")).unwrap(),
        "hello\nworld\n"
    );

    let outcome = apply_series(&tree, patches_dir.path(), Platform::Linux, false).unwrap();
    assert!(outcome.is_clean(), "failed: {:?}", outcome.failed);
    assert_eq!(fs::read_to_string(root.join("greeting.txt")).unwrap(), edited);
}

/// A brand-new untracked file survives the round trip.
#[test]
fn add_round_trip_recreates_file() {
    let (tree_dir, base) = setup_tree();
    let root = tree_dir.path();
    let content = "first line\nsecond line\n";
    fs::create_dir_all(root.join("nested/deep")).unwrap();
    fs::write(root.join("nested/deep/fresh.cc"), content).unwrap();

    let tree = GitTree::new(root);
    let patch = extract(&tree, Path::new("nested/deep/fresh.cc"), &base).unwrap();
    assert!(matches!(patch.change, FileChange::Add { .. }));

    let patches_dir = TempDir::new().unwrap();
    let store = PatchStore::new(patches_dir.path());
    store.write_patch(&patch, false, &NeverConfirm).unwrap();
    fs::write(
        patches_dir.path().join("series"),
        "nested/deep/fresh.cc.patch\n",
    )
    .unwrap();

    reset_tree(root);
    assert!(!root.join("nested/deep/fresh.cc").exists());

    let outcome = apply_series(&tree, patches_dir.path(), Platform::Linux, false).unwrap();
    assert!(outcome.is_clean(), "failed: {:?}", outcome.failed);
    assert_eq!(
        fs::read_to_string(root.join("nested/deep/fresh.cc")).unwrap(),
        content
    );
}

/// A text file in a non-UTF-8 encoding round-trips byte-identically: the
/// artifact carries git's raw output, never a lossy re-encode.
#[test]
fn non_utf8_round_trip_is_byte_identical() {
    let (tree_dir, _base) = setup_tree();
    let root = tree_dir.path();
    // Latin-1 "café crème" — text to git, invalid UTF-8.
    fs::write(root.join("menu.txt"), b"menu\ncaf\xe9 cr\xe8me\n").unwrap();
    run_git(root, &["add", "menu.txt"]);
    run_git(root, &["commit", "-m", "menu"]);
    let base = run_git(root, &["rev-parse", "HEAD"]);

    let edited: &[u8] = b"menu\ncaf\xe9 noir\n";
    fs::write(root.join("menu.txt"), edited).unwrap();

    let tree = GitTree::new(root);
    let patch = extract(&tree, Path::new("menu.txt"), &base).unwrap();
    let diff = patch.diff_content().unwrap();
    let replacement = "\u{FFFD}".as_bytes();
    assert!(
        !diff.windows(replacement.len()).any(|w| w == replacement),
        "artifact corrupted before reaching the store: {diff:?}"
    );

    let patches_dir = TempDir::new().unwrap();
    let store = PatchStore::new(patches_dir.path());
    store.write_patch(&patch, false, &NeverConfirm).unwrap();
    fs::write(patches_dir.path().join("series"), "menu.txt.patch\n").unwrap();

    reset_tree(root);
    assert_eq!(
        fs::read(root.join("menu.txt")).unwrap(),
        b"menu\ncaf\xe9 cr\xe8me\n"
    );

    let outcome = apply_series(&tree, patches_dir.path(), Platform::Linux, false).unwrap();
    assert!(outcome.is_clean(), "failed: {:?}", outcome.failed);
    assert_eq!(fs::read(root.join("menu.txt")).unwrap(), edited);
}

/// Deleting a file produces a marker artifact; applying the series removes
/// the file, and applying again over the absent file still succeeds.
#[test]
fn delete_round_trip_and_absent_noop() {
    let (tree_dir, base) = setup_tree();
    let root = tree_dir.path();
    fs::remove_file(root.join("nested/config.h")).unwrap();

    let tree = GitTree::new(root);
    let patch = extract(&tree, Path::new("nested/config.h"), &base).unwrap();
    assert_eq!(patch.change, FileChange::Delete);

    let patches_dir = TempDir::new().unwrap();
    let store = PatchStore::new(patches_dir.path());
    let artifact = store.write_patch(&patch, false, &NeverConfirm).unwrap();
    assert!(is_deletion_marker(&fs::read(&artifact).unwrap()));
    fs::write(patches_dir.path().join("series"), "nested/config.h.patch\n").unwrap();

    reset_tree(root);
    assert!(root.join("nested/config.h").exists());

    let outcome = apply_series(&tree, patches_dir.path(), Platform::Linux, false).unwrap();
    assert!(outcome.is_clean(), "failed: {:?}", outcome.failed);
    assert!(!root.join("nested/config.h").exists());

    // Second run: the target is already gone, which is the desired state.
    let again = apply_series(&tree, patches_dir.path(), Platform::Linux, false).unwrap();
    assert!(again.is_clean(), "failed: {:?}", again.failed);
}

/// Dry-run verifies a series without touching the tree.
#[test]
fn dry_run_never_mutates() {
    let (tree_dir, base) = setup_tree();
    let root = tree_dir.path();
    fs::write(root.join("greeting.txt"), "hello\npatched\n").unwrap();

    let tree = GitTree::new(root);
    let modify = extract(&tree, Path::new("greeting.txt"), &base).unwrap();
    fs::remove_file(root.join("nested/config.h")).unwrap();
    let delete = extract(&tree, Path::new("nested/config.h"), &base).unwrap();

    let patches_dir = TempDir::new().unwrap();
    let store = PatchStore::new(patches_dir.path());
    store.write_patch(&modify, false, &NeverConfirm).unwrap();
    store.write_patch(&delete, false, &NeverConfirm).unwrap();
    fs::write(
        patches_dir.path().join("series"),
        "greeting.txt.patch\nnested/config.h.patch\n",
    )
    .unwrap();

    reset_tree(root);
    let before_greeting = fs::read_to_string(root.join("greeting.txt")).unwrap();

    let outcome = apply_series(&tree, patches_dir.path(), Platform::Linux, true).unwrap();
    assert!(outcome.is_clean(), "failed: {:?}", outcome.failed);
    assert_eq!(outcome.applied.len(), 2);

    assert_eq!(
        fs::read_to_string(root.join("greeting.txt")).unwrap(),
        before_greeting
    );
    assert!(root.join("nested/config.h").exists());
}

/// Extracting twice without force keeps the first artifact.
#[test]
fn second_extract_needs_confirmation() {
    let (tree_dir, base) = setup_tree();
    let root = tree_dir.path();
    fs::write(root.join("greeting.txt"), "hello\nv1\n").unwrap();

    let tree = GitTree::new(root);
    let first = extract(&tree, Path::new("greeting.txt"), &base).unwrap();

    let patches_dir = TempDir::new().unwrap();
    let store = PatchStore::new(patches_dir.path());
    store.write_patch(&first, false, &NeverConfirm).unwrap();

    fs::write(root.join("greeting.txt"), "hello\nv2\n").unwrap();
    let second = extract(&tree, Path::new("greeting.txt"), &base).unwrap();
    assert!(store.write_patch(&second, false, &NeverConfirm).is_err());

    // Forced write replaces the artifact.
    store.write_patch(&second, true, &NeverConfirm).unwrap();
    let artifact = store.artifact_path(Path::new("greeting.txt"));
    assert!(fs::read_to_string(artifact).unwrap().contains("+v2"));
}
