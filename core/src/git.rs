use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a task branch is integrated into trunk
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Regular merge commit
    Merge,
    /// Collapse the branch's commits into a single commit on trunk
    #[default]
    Squash,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::Merge => write!(f, "merge"),
            MergeStrategy::Squash => write!(f, "squash"),
        }
    }
}

/// Result of a merge attempt. On failure with unmerged paths the paths
/// are listed; the repository is left mid-merge for the caller to abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub success: bool,
    pub conflicts: Vec<String>,
}

impl MergeOutcome {
    pub fn clean() -> Self {
        MergeOutcome {
            success: true,
            conflicts: Vec::new(),
        }
    }

    pub fn conflicted(conflicts: Vec<String>) -> Self {
        MergeOutcome {
            success: false,
            conflicts,
        }
    }
}

/// Driver over an external git binary operating on a single repository.
///
/// The contract is narrow: every method either succeeds or leaves the
/// repository in a state the caller can recover from (removing leftover
/// worktrees, aborting merges). Failures carry git's stderr in the
/// [`CoordError::Git`](crate::error::CoordError::Git) message. The driver
/// is not concurrency-controlled; correctness relies on callers using
/// disjoint worktree paths and branch names per task.
#[async_trait]
pub trait GitDriver: Send + Sync {
    /// Repository root, discovered once and cached per driver instance
    fn repo_root(&self) -> &Path;

    /// Create a worktree at `path` on a new branch `new_branch`.
    ///
    /// Atomic from the driver's perspective: on failure neither the
    /// worktree nor the branch persists (git's own semantics).
    async fn create_worktree(&self, path: &Path, new_branch: &str) -> Result<()>;

    /// Forcefully remove the worktree at `path`
    async fn remove_worktree(&self, path: &Path) -> Result<()>;

    /// Forcefully delete a local branch
    async fn delete_branch(&self, name: &str) -> Result<()>;

    /// Current branch name, or `None` when HEAD is detached
    async fn current_branch(&self) -> Result<Option<String>>;

    /// Whether the repository is currently on trunk (`main` or `master`)
    async fn on_trunk(&self) -> Result<bool>;

    /// Commit hash of `reference` (HEAD when absent)
    async fn latest_commit(&self, reference: Option<&str>) -> Result<String>;

    /// Whether `path` appears in `git worktree list`
    async fn worktree_exists(&self, path: &Path) -> Result<bool>;

    /// Attempt to merge `branch` into the current branch.
    ///
    /// # Returns
    /// * `Ok(MergeOutcome { success: true, .. })` - clean merge
    /// * `Ok(MergeOutcome { success: false, conflicts })` - git failed and
    ///   unmerged paths exist; the merge is left in place for the caller
    ///   to resolve or abort
    /// * `Err(CoordError::Git)` - git failed with no unmerged paths
    async fn merge(&self, branch: &str, strategy: MergeStrategy) -> Result<MergeOutcome>;

    /// Abort an in-progress merge
    async fn abort_merge(&self) -> Result<()>;

    /// True iff trunk has commits newer than `commit`. Tries `main`
    /// first, falls back to `master`.
    async fn trunk_ahead_of(&self, commit: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_wire_format() {
        assert_eq!(serde_json::to_string(&MergeStrategy::Squash).unwrap(), "\"squash\"");
        assert_eq!(
            serde_json::from_str::<MergeStrategy>("\"merge\"").unwrap(),
            MergeStrategy::Merge
        );
        assert_eq!(MergeStrategy::default(), MergeStrategy::Squash);
    }

    #[test]
    fn test_merge_outcome_constructors() {
        assert!(MergeOutcome::clean().success);
        let outcome = MergeOutcome::conflicted(vec!["src/db/schema.ts".to_string()]);
        assert!(!outcome.success);
        assert_eq!(outcome.conflicts.len(), 1);
    }
}
