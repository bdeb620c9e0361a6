//! Mock implementation of the GitDriver trait.
//!
//! Thread-safe, with error injection, call history tracking, and
//! configurable merge/trunk behavior so service tests can exercise the
//! state machine without a real repository.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use weft_core::{
    error::{CoordError, Result},
    git::{GitDriver, MergeOutcome, MergeStrategy},
};

#[derive(Debug, Default)]
struct MockGitState {
    worktrees: HashSet<PathBuf>,
    branches: HashSet<String>,
    calls: Vec<String>,
    inject_error: Option<CoordError>,
    on_trunk: bool,
    current_branch: Option<String>,
    trunk_ahead: bool,
    merge_conflicts: Option<Vec<String>>,
}

/// Scriptable in-memory git driver for tests
#[derive(Debug, Clone)]
pub struct MockGitDriver {
    root: PathBuf,
    state: Arc<Mutex<MockGitState>>,
}

impl Default for MockGitDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitDriver {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/repo"),
            state: Arc::new(Mutex::new(MockGitState {
                on_trunk: true,
                current_branch: Some("main".to_string()),
                ..Default::default()
            })),
        }
    }

    pub fn with_root(root: PathBuf) -> Self {
        let mock = Self::new();
        Self { root, ..mock }
    }

    /// Fail the next git call with `error`
    pub fn inject_error(&self, error: CoordError) {
        self.state.lock().inject_error = Some(error);
    }

    /// Pretend the repository HEAD is on `branch`
    pub fn set_current_branch(&self, branch: Option<&str>) {
        let mut state = self.state.lock();
        state.current_branch = branch.map(String::from);
        state.on_trunk = matches!(branch, Some("main") | Some("master"));
    }

    /// Make the next merges report these conflicted paths
    pub fn set_merge_conflicts(&self, conflicts: Vec<String>) {
        self.state.lock().merge_conflicts = Some(conflicts);
    }

    /// Make merges clean again
    pub fn clear_merge_conflicts(&self) {
        self.state.lock().merge_conflicts = None;
    }

    /// Control the rebase-recommended signal
    pub fn set_trunk_ahead(&self, ahead: bool) {
        self.state.lock().trunk_ahead = ahead;
    }

    /// History of driver calls, oldest first
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Branches currently present in the mock repository
    pub fn branches(&self) -> Vec<String> {
        let mut branches: Vec<String> = self.state.lock().branches.iter().cloned().collect();
        branches.sort();
        branches
    }

    /// Worktrees currently present in the mock repository
    pub fn worktrees(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state.lock().worktrees.iter().cloned().collect();
        paths.sort();
        paths
    }

    pub fn assert_called(&self, fragment: &str) {
        let calls = self.calls();
        assert!(
            calls.iter().any(|c| c.contains(fragment)),
            "no call containing '{fragment}'; call history: {calls:?}"
        );
    }

    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if let Some(error) = state.inject_error.take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl GitDriver for MockGitDriver {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    async fn create_worktree(&self, path: &Path, new_branch: &str) -> Result<()> {
        self.record(format!("create_worktree {} {}", path.display(), new_branch))?;
        let mut state = self.state.lock();
        if state.worktrees.contains(path) {
            return Err(CoordError::Git(format!(
                "fatal: '{}' already exists",
                path.display()
            )));
        }
        if state.branches.contains(new_branch) {
            return Err(CoordError::Git(format!(
                "fatal: a branch named '{new_branch}' already exists"
            )));
        }
        state.worktrees.insert(path.to_path_buf());
        state.branches.insert(new_branch.to_string());
        Ok(())
    }

    async fn remove_worktree(&self, path: &Path) -> Result<()> {
        self.record(format!("remove_worktree {}", path.display()))?;
        let mut state = self.state.lock();
        if !state.worktrees.remove(path) {
            return Err(CoordError::Git(format!(
                "fatal: '{}' is not a working tree",
                path.display()
            )));
        }
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        self.record(format!("delete_branch {name}"))?;
        let mut state = self.state.lock();
        if !state.branches.remove(name) {
            return Err(CoordError::Git(format!(
                "error: branch '{name}' not found"
            )));
        }
        Ok(())
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        self.record("current_branch".to_string())?;
        Ok(self.state.lock().current_branch.clone())
    }

    async fn on_trunk(&self) -> Result<bool> {
        self.record("on_trunk".to_string())?;
        Ok(self.state.lock().on_trunk)
    }

    async fn latest_commit(&self, reference: Option<&str>) -> Result<String> {
        self.record(format!("latest_commit {}", reference.unwrap_or("HEAD")))?;
        Ok("0123456789abcdef0123456789abcdef01234567".to_string())
    }

    async fn worktree_exists(&self, path: &Path) -> Result<bool> {
        self.record(format!("worktree_exists {}", path.display()))?;
        Ok(self.state.lock().worktrees.contains(path))
    }

    async fn merge(&self, branch: &str, strategy: MergeStrategy) -> Result<MergeOutcome> {
        self.record(format!("merge {branch} ({strategy})"))?;
        let state = self.state.lock();
        if !state.branches.contains(branch) {
            return Err(CoordError::Git(format!(
                "merge: {branch} - not something we can merge"
            )));
        }
        match &state.merge_conflicts {
            Some(conflicts) => Ok(MergeOutcome::conflicted(conflicts.clone())),
            None => Ok(MergeOutcome::clean()),
        }
    }

    async fn abort_merge(&self) -> Result<()> {
        self.record("abort_merge".to_string())?;
        Ok(())
    }

    async fn trunk_ahead_of(&self, commit: &str) -> Result<bool> {
        self.record(format!("trunk_ahead_of {commit}"))?;
        Ok(self.state.lock().trunk_ahead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_worktree_and_branch_tracking() {
        let git = MockGitDriver::new();
        let path = Path::new("/repo/.worktrees/task-1-a");

        git.create_worktree(path, "task/task-1-a").await.unwrap();
        assert!(git.worktree_exists(path).await.unwrap());
        assert_eq!(git.branches(), vec!["task/task-1-a".to_string()]);

        // Duplicate creation fails like real git.
        assert!(git.create_worktree(path, "task/task-1-b").await.is_err());

        git.remove_worktree(path).await.unwrap();
        git.delete_branch("task/task-1-a").await.unwrap();
        assert!(git.branches().is_empty());
        assert!(git.worktrees().is_empty());
    }

    #[tokio::test]
    async fn test_error_injection_fires_once() {
        let git = MockGitDriver::new();
        git.inject_error(CoordError::Git("boom".to_string()));
        assert!(git.on_trunk().await.is_err());
        assert!(git.on_trunk().await.unwrap());
    }

    #[tokio::test]
    async fn test_configured_merge_conflicts() {
        let git = MockGitDriver::new();
        git.create_worktree(Path::new("/repo/.worktrees/t"), "task/t")
            .await
            .unwrap();
        git.set_merge_conflicts(vec!["src/db/schema.ts".to_string()]);

        let outcome = git.merge("task/t", MergeStrategy::Squash).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.conflicts, vec!["src/db/schema.ts".to_string()]);

        git.clear_merge_conflicts();
        assert!(git.merge("task/t", MergeStrategy::Squash).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_call_history() {
        let git = MockGitDriver::new();
        let _ = git.on_trunk().await;
        let _ = git.latest_commit(None).await;
        git.assert_called("on_trunk");
        git.assert_called("latest_commit HEAD");
    }
}
