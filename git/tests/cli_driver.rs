//! CliGitDriver integration tests against scratch repositories.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;
use weft_core::git::{GitDriver, MergeStrategy};
use weft_git::CliGitDriver;

/// Run git in `dir`, panicking on failure (test setup only)
fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn commit_file(dir: &Path, name: &str, contents: &str, message: &str) {
    fs::write(dir.join(name), contents).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", message]);
}

/// Scratch repository on branch `main` with one commit
fn scratch_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir.path(), &["config", "user.email", "dev@example.com"]);
    git(dir.path(), &["config", "user.name", "Dev"]);
    commit_file(dir.path(), "README.md", "hello\n", "initial commit");
    dir
}

#[tokio::test]
async fn test_discover_finds_repo_root() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();
    assert_eq!(
        driver.repo_root().canonicalize().unwrap(),
        repo.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn test_trunk_detection() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();
    assert_eq!(driver.current_branch().await.unwrap().as_deref(), Some("main"));
    assert!(driver.on_trunk().await.unwrap());
}

#[tokio::test]
async fn test_worktree_lifecycle() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();
    let worktree = repo.path().join(".worktrees").join("task-1-db-schema");

    assert!(!driver.worktree_exists(&worktree).await.unwrap());
    driver
        .create_worktree(&worktree, "task/task-1-db-schema")
        .await
        .unwrap();
    assert!(driver.worktree_exists(&worktree).await.unwrap());
    assert!(worktree.join("README.md").exists());

    driver.remove_worktree(&worktree).await.unwrap();
    assert!(!driver.worktree_exists(&worktree).await.unwrap());
    driver.delete_branch("task/task-1-db-schema").await.unwrap();
}

#[tokio::test]
async fn test_create_worktree_failure_leaves_no_branch() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();

    // Target path already occupied by a file: git refuses.
    let blocked = repo.path().join("README.md");
    let err = driver
        .create_worktree(&blocked, "task/task-9-blocked")
        .await
        .unwrap_err();
    assert!(err.is_git());

    // Branch creation must not have stuck.
    let output = Command::new("git")
        .args(["branch", "--list", "task/task-9-blocked"])
        .current_dir(repo.path())
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).trim().is_empty());
}

#[tokio::test]
async fn test_squash_merge_clean() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();
    let worktree = repo.path().join(".worktrees").join("task-1-feature");

    driver
        .create_worktree(&worktree, "task/task-1-feature")
        .await
        .unwrap();
    git(&worktree, &["config", "user.email", "dev@example.com"]);
    git(&worktree, &["config", "user.name", "Dev"]);
    commit_file(&worktree, "feature.txt", "done\n", "add feature");

    let before = driver.latest_commit(Some("main")).await.unwrap();
    let outcome = driver
        .merge("task/task-1-feature", MergeStrategy::Squash)
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.conflicts.is_empty());
    assert!(repo.path().join("feature.txt").exists());

    // Squash produced exactly one new commit on trunk.
    let after = driver.latest_commit(Some("main")).await.unwrap();
    assert_ne!(before, after);
}

#[tokio::test]
async fn test_conflicting_merge_reports_paths_and_aborts() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();
    let worktree = repo.path().join(".worktrees").join("task-1-conflict");

    driver
        .create_worktree(&worktree, "task/task-1-conflict")
        .await
        .unwrap();
    git(&worktree, &["config", "user.email", "dev@example.com"]);
    git(&worktree, &["config", "user.name", "Dev"]);
    commit_file(&worktree, "README.md", "branch version\n", "branch edit");
    commit_file(repo.path(), "README.md", "trunk version\n", "trunk edit");

    let outcome = driver
        .merge("task/task-1-conflict", MergeStrategy::Squash)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.conflicts, vec!["README.md".to_string()]);

    driver.abort_merge().await.unwrap();
    let status = Command::new("git")
        .args(["status", "--porcelain", "--untracked-files=no"])
        .current_dir(repo.path())
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&status.stdout).trim().is_empty());
}

#[tokio::test]
async fn test_trunk_ahead_detection() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();

    let head = driver.latest_commit(None).await.unwrap();
    assert!(!driver.trunk_ahead_of(&head).await.unwrap());

    commit_file(repo.path(), "new.txt", "x\n", "advance trunk");
    assert!(driver.trunk_ahead_of(&head).await.unwrap());

    let new_head = driver.latest_commit(None).await.unwrap();
    assert!(!driver.trunk_ahead_of(&new_head).await.unwrap());
}

#[tokio::test]
async fn test_empty_squash_is_clean() {
    let repo = scratch_repo();
    let driver = CliGitDriver::discover(repo.path()).await.unwrap();
    let worktree = repo.path().join(".worktrees").join("task-1-noop");

    // Branch with no commits of its own: squash stages nothing.
    driver
        .create_worktree(&worktree, "task/task-1-noop")
        .await
        .unwrap();
    let outcome = driver
        .merge("task/task-1-noop", MergeStrategy::Squash)
        .await
        .unwrap();
    assert!(outcome.success);
}
