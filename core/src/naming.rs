//! Branch and worktree naming derived from a task's sequence and title.

use std::path::{Path, PathBuf};

/// Directory under the repository root holding task worktrees
pub const WORKTREE_DIR: &str = ".worktrees";

const MAX_SLUG_LEN: usize = 30;

/// Reduce a title to a strict lowercase slug of at most 30 characters:
/// ASCII alphanumerics kept, everything else collapsed to single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true; // suppress leading hyphen
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

/// Branch for a task: `task/task-{sequence}-{slug}`
pub fn branch_name(sequence: i64, title: &str) -> String {
    format!("task/task-{}-{}", sequence, slugify(title))
}

/// Directory name of a task worktree: `task-{sequence}-{slug}`
pub fn worktree_dirname(sequence: i64, title: &str) -> String {
    format!("task-{}-{}", sequence, slugify(title))
}

/// Absolute worktree path: `{repo_root}/.worktrees/task-{sequence}-{slug}`
pub fn worktree_path(repo_root: &Path, sequence: i64, title: &str) -> PathBuf {
    repo_root
        .join(WORKTREE_DIR)
        .join(worktree_dirname(sequence, title))
}
