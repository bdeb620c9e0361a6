//! Git driver for the weft coordination engine.
//!
//! [`CliGitDriver`] implements the `GitDriver` trait from `weft-core` by
//! shelling out to the external `git` binary. Every failure surfaces the
//! underlying stderr; every method either succeeds or leaves the
//! repository in a state the caller can recover from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use weft_core::{
    error::{CoordError, Result},
    git::{GitDriver, MergeOutcome, MergeStrategy},
};

/// Production git driver backed by the `git` binary.
///
/// The repository root is discovered once at construction and every
/// command runs with the root as its working directory, so the driver's
/// behavior does not depend on the server process's cwd.
#[derive(Debug, Clone)]
pub struct CliGitDriver {
    root: PathBuf,
}

impl CliGitDriver {
    /// Discover the repository containing `dir` (`rev-parse --show-toplevel`)
    pub async fn discover(dir: &Path) -> Result<Self> {
        let stdout = run_git(dir, &["rev-parse", "--show-toplevel"]).await?;
        Ok(Self {
            root: PathBuf::from(stdout.trim()),
        })
    }

    /// Driver over an already-known repository root
    pub fn at_root(root: PathBuf) -> Self {
        Self { root }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        run_git(&self.root, args).await
    }

    /// Paths with unresolved merge conflicts in the working tree
    async fn unmerged_paths(&self) -> Result<Vec<String>> {
        let stdout = self
            .run(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

/// Run a git command and return its stdout; failures carry git's stderr.
async fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| CoordError::Git(format!("failed to spawn git {}: {e}", args.join(" "))))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CoordError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse `git worktree list --porcelain` output into worktree paths
fn parse_worktree_paths(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("worktree "))
        .map(PathBuf::from)
        .collect()
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

#[async_trait]
impl GitDriver for CliGitDriver {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    async fn create_worktree(&self, path: &Path, new_branch: &str) -> Result<()> {
        let path_str = path.display().to_string();
        self.run(&["worktree", "add", "-b", new_branch, &path_str])
            .await?;
        tracing::debug!(worktree = %path_str, branch = new_branch, "worktree created");
        Ok(())
    }

    async fn remove_worktree(&self, path: &Path) -> Result<()> {
        let path_str = path.display().to_string();
        self.run(&["worktree", "remove", "--force", &path_str])
            .await?;
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        self.run(&["branch", "-D", name]).await?;
        Ok(())
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        let stdout = self.run(&["branch", "--show-current"]).await?;
        let branch = stdout.trim();
        if branch.is_empty() {
            Ok(None) // detached HEAD
        } else {
            Ok(Some(branch.to_string()))
        }
    }

    async fn on_trunk(&self) -> Result<bool> {
        Ok(matches!(
            self.current_branch().await?.as_deref(),
            Some("main") | Some("master")
        ))
    }

    async fn latest_commit(&self, reference: Option<&str>) -> Result<String> {
        let stdout = self
            .run(&["rev-parse", reference.unwrap_or("HEAD")])
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn worktree_exists(&self, path: &Path) -> Result<bool> {
        let stdout = self.run(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_paths(&stdout)
            .iter()
            .any(|listed| paths_equal(listed, path)))
    }

    async fn merge(&self, branch: &str, strategy: MergeStrategy) -> Result<MergeOutcome> {
        let merge_result = match strategy {
            MergeStrategy::Squash => self.run(&["merge", "--squash", branch]).await,
            MergeStrategy::Merge => {
                let message = format!("Merge branch '{branch}'");
                self.run(&["merge", "--no-ff", branch, "-m", &message])
                    .await
            }
        };

        if let Err(err) = merge_result {
            // A failed merge with unmerged paths is a conflict report,
            // not an error; anything else propagates.
            let conflicts = self.unmerged_paths().await.unwrap_or_default();
            if conflicts.is_empty() {
                return Err(err);
            }
            return Ok(MergeOutcome::conflicted(conflicts));
        }

        if strategy == MergeStrategy::Squash {
            // --squash stages the combined diff without committing. An
            // empty squash (branch already contained in trunk) stages
            // nothing and needs no commit.
            if self.run(&["diff", "--cached", "--quiet"]).await.is_err() {
                let message = format!("Merge branch '{branch}' (squash)");
                self.run(&["commit", "-m", &message]).await?;
            }
        }

        Ok(MergeOutcome::clean())
    }

    async fn abort_merge(&self) -> Result<()> {
        self.run(&["merge", "--abort"]).await?;
        Ok(())
    }

    async fn trunk_ahead_of(&self, commit: &str) -> Result<bool> {
        let mut last_err = CoordError::Git("no trunk branch (main or master) found".to_string());
        for trunk in ["main", "master"] {
            let range = format!("{commit}..{trunk}");
            match self.run(&["rev-list", "--count", &range]).await {
                Ok(stdout) => {
                    let count: u64 = stdout.trim().parse().map_err(|e| {
                        CoordError::Git(format!("failed to parse rev-list count: {e}"))
                    })?;
                    return Ok(count > 0);
                }
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}
