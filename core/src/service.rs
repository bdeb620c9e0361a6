//! The task coordination state machine.
//!
//! `TaskService` is the only component the transport layer invokes. Each
//! operation composes the store, the DAG engine, the ownership engine,
//! and the git driver into one externally visible step, honoring the
//! state machine:
//!
//! ```text
//! pending ─claim→ assigned ─start→ in_progress ─complete→ in_review
//!    ▲                                                        │ merge
//! blocked ◄── (dependency satisfaction, auto-propagated)      ▼
//!                                                         completed
//! any non-terminal ─cleanup→ failed
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dag,
    error::{CoordError, Result},
    git::GitDriver,
    models::{
        NewProgressLog, NewTask, NewTaskGroup, PatternClaim, ProgressEvent, ProgressLog, Task,
        TaskFilter, TaskSeed, TaskStatus, TaskUpdate,
    },
    naming,
    ownership::{self, TaskPatterns},
    protocol::{
        ClaimTaskParams, ClaimTaskResult, CleanupOutcome, CleanupTaskParams, CleanupTaskResult,
        CompleteTaskParams, CompleteTaskResult, CompletedDependency, ConflictEntry,
        CreateTasksParams, CreateTasksResult, DependencyInfo, GetTaskParams, HealthStatus,
        ListTasksParams, ListTasksResult, MergeResultKind, MergeTaskParams, MergeTaskResult,
        StartTaskParams, StartTaskResult, StatusCounts, TaskDetail, TaskSummary,
        UpdateProgressParams, UpdateProgressResult,
    },
    store::TaskStore,
};

/// Coordinates the task state machine over a store and a git driver.
///
/// Cloneable and cheap to share; all state lives behind the store.
pub struct TaskService<S, G> {
    store: Arc<S>,
    git: Arc<G>,
}

impl<S, G> Clone for TaskService<S, G> {
    fn clone(&self) -> Self {
        TaskService {
            store: self.store.clone(),
            git: self.git.clone(),
        }
    }
}

impl<S, G> TaskService<S, G> {
    pub fn new(store: Arc<S>, git: Arc<G>) -> Self {
        TaskService { store, git }
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    pub fn git(&self) -> Arc<G> {
        self.git.clone()
    }
}

/// Opaque short worker token handed out when a claim arrives without one
fn generate_agent_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("agent-{}", &id[..8])
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Per-status tallies over a result set
fn status_counts(tasks: &[Task]) -> StatusCounts {
    let mut counts = StatusCounts {
        total: tasks.len(),
        ..Default::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::Pending => counts.pending += 1,
            TaskStatus::Blocked => counts.blocked += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::InReview => counts.in_review += 1,
            TaskStatus::Completed => counts.completed += 1,
            TaskStatus::Assigned | TaskStatus::Failed => {}
        }
    }
    counts
}

fn task_label(task: &Task) -> String {
    format!("task {} '{}'", task.sequence, task.title)
}

impl<S: TaskStore, G: GitDriver> TaskService<S, G> {
    /// Atomic construction of a task group from an already-structured
    /// task list. Dependency references are 1-based sequence indices;
    /// unknown references are dropped with a warning. Cycles and
    /// exclusive pattern overlaps warn but do not block creation.
    pub async fn create_tasks(&self, params: CreateTasksParams) -> Result<CreateTasksResult> {
        if params.tasks.is_empty() {
            return Err(CoordError::Validation(
                "create_tasks requires at least one task".to_string(),
            ));
        }

        let group_id = new_id();
        let task_count = params.tasks.len() as i64;
        let mut warnings = Vec::new();
        let mut seeds = Vec::with_capacity(params.tasks.len());

        for (idx, spec) in params.tasks.iter().enumerate() {
            let sequence = idx as i64 + 1;

            // Deduplicate and validate sequence references; an unknown
            // reference drops the edge but keeps the task.
            let mut depends = BTreeSet::new();
            for &dep in &spec.depends_on {
                if dep >= 1 && dep <= task_count {
                    depends.insert(dep);
                } else {
                    warnings.push(format!(
                        "Task {} '{}' references unknown dependency sequence {}; edge dropped",
                        sequence, spec.title, dep
                    ));
                }
            }
            let depends: Vec<i64> = depends.into_iter().collect();

            let status = if depends.is_empty() {
                TaskStatus::Pending
            } else {
                TaskStatus::Blocked
            };

            seeds.push(TaskSeed {
                task: NewTask {
                    id: new_id(),
                    group_id: group_id.clone(),
                    sequence,
                    title: spec.title.clone(),
                    description: spec.description.clone(),
                    status,
                    priority: spec.priority,
                },
                depends_on_sequences: depends,
                file_patterns: spec
                    .file_patterns
                    .iter()
                    .map(|f| PatternClaim {
                        pattern: f.pattern.clone(),
                        ownership: f.ownership_type,
                    })
                    .collect(),
            });
        }

        // Cycle validation over the sequence-keyed edge set. The group is
        // still created on failure; tasks on the cycle stay blocked until
        // someone intervenes.
        let dep_map: HashMap<String, Vec<String>> = seeds
            .iter()
            .map(|s| {
                (
                    s.task.sequence.to_string(),
                    s.depends_on_sequences
                        .iter()
                        .map(|d| d.to_string())
                        .collect(),
                )
            })
            .collect();
        let check = dag::validate_no_cycles(&dep_map);
        if !check.valid {
            warnings.push(format!(
                "Dependency cycle detected (task sequence {}); the tasks on this cycle can never start",
                check.cycle.join(" -> ")
            ));
        }

        // Pairwise pattern-overlap warnings where at least one side is
        // exclusive.
        for i in 0..seeds.len() {
            for j in (i + 1)..seeds.len() {
                for pa in &seeds[i].file_patterns {
                    for pb in &seeds[j].file_patterns {
                        let exclusive_side = pa.ownership
                            == crate::models::OwnershipType::Exclusive
                            || pb.ownership == crate::models::OwnershipType::Exclusive;
                        if exclusive_side && ownership::patterns_overlap(&pa.pattern, &pb.pattern) {
                            warnings.push(format!(
                                "Tasks '{}' and '{}' declare overlapping file patterns '{}' and '{}' with exclusive ownership",
                                seeds[i].task.title, seeds[j].task.title, pa.pattern, pb.pattern
                            ));
                        }
                    }
                }
            }
        }

        let (group, tasks) = self
            .store
            .create_group_with_tasks(
                NewTaskGroup {
                    id: group_id,
                    title: params.title,
                    description: params.description,
                },
                seeds,
            )
            .await?;

        info!(
            group_id = %group.id,
            tasks = tasks.len(),
            warnings = warnings.len(),
            "task group created"
        );

        let summaries = tasks
            .iter()
            .map(|t| TaskSummary::from_task(t, Some(t.status == TaskStatus::Pending)))
            .collect();

        Ok(CreateTasksResult {
            group_id: group.id,
            tasks: summaries,
            warnings,
        })
    }

    /// Read matching tasks; `can_start` is computed for `pending` tasks
    /// only, plus a per-status tally of the result set.
    pub async fn list_tasks(&self, params: ListTasksParams) -> Result<ListTasksResult> {
        let tasks = self
            .store
            .list_tasks(TaskFilter {
                group_id: params.group_id,
                statuses: params.status,
            })
            .await?;

        let mut summaries = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let can_start = if task.status == TaskStatus::Pending {
                let deps = self.store.get_dependencies(&task.id).await?;
                Some(deps.iter().all(|d| d.status == TaskStatus::Completed))
            } else {
                None
            };
            summaries.push(TaskSummary::from_task(task, can_start));
        }

        Ok(ListTasksResult {
            summary: status_counts(&tasks),
            tasks: summaries,
        })
    }

    /// Full task detail: the record, its dependency projection, its
    /// file-ownership set, and its complete progress log.
    pub async fn get_task(&self, params: GetTaskParams) -> Result<TaskDetail> {
        let task = self.require_task(&params.task_id).await?;
        let dependencies = self
            .store
            .get_dependencies(&task.id)
            .await?
            .into_iter()
            .map(|d| DependencyInfo {
                sequence: d.sequence,
                title: d.title,
                status: d.status,
            })
            .collect();
        let file_ownership = self.store.get_file_ownership(&task.id).await?;
        let progress_log = self.store.list_progress(&task.id).await?;

        Ok(TaskDetail {
            task,
            dependencies,
            file_ownership,
            progress_log,
        })
    }

    /// Guarded transition pending -> assigned.
    ///
    /// Preconditions are checked in order and each failure is soft: the
    /// result carries `{success: false, error}` and nothing is mutated.
    /// The transition itself is an atomic compare-and-set in the store,
    /// so of two concurrent claims exactly one succeeds and the loser
    /// observes the post-write state.
    pub async fn claim_task(&self, params: ClaimTaskParams) -> Result<ClaimTaskResult> {
        let Some(task) = self.store.get_task(&params.task_id).await? else {
            return Ok(ClaimTaskResult::rejected(format!(
                "Task '{}' not found",
                params.task_id
            )));
        };

        if task.status != TaskStatus::Pending {
            return Ok(ClaimTaskResult::rejected(format!(
                "Task is {} and cannot be claimed",
                task.status
            )));
        }

        let deps = self.store.get_dependencies(&task.id).await?;
        let unmet: Vec<String> = deps
            .iter()
            .filter(|d| d.status != TaskStatus::Completed)
            .map(|d| format!("{} is {}", task_label(d), d.status))
            .collect();
        if !unmet.is_empty() {
            return Ok(ClaimTaskResult::rejected(format!(
                "Unmet dependencies: {}",
                unmet.join(", ")
            )));
        }

        let held = self.store.find_ownership_conflicts(&task.id).await?;
        if let Some(conflict) = held.first() {
            return Ok(ClaimTaskResult::rejected(format!(
                "File pattern '{}' is currently held by in-progress {}",
                conflict.file_pattern,
                task_label(&conflict.task)
            )));
        }

        let agent_id = params
            .agent_id
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(generate_agent_id);

        if !self.store.try_claim(&task.id, &agent_id).await? {
            // Lost the race; report what the winner left behind.
            let now = self
                .store
                .get_task(&task.id)
                .await?
                .map(|t| t.status.to_string())
                .unwrap_or_else(|| "gone".to_string());
            return Ok(ClaimTaskResult::rejected(format!(
                "Task was claimed concurrently and is now {now}"
            )));
        }

        let claimed = self.require_task(&task.id).await?;
        self.append_log(
            &task.id,
            ProgressEvent::Claimed,
            format!("Claimed by {agent_id}"),
            Some(json!({ "agent_id": agent_id })),
        )
        .await?;

        info!(task_id = %task.id, agent_id = %agent_id, "task claimed");
        Ok(ClaimTaskResult::granted(claimed, agent_id))
    }

    /// Guarded transition assigned -> in_progress: derive the branch and
    /// worktree, create them via the git driver, then record them. A git
    /// failure aborts the transition and the task stays `assigned`.
    pub async fn start_task(&self, params: StartTaskParams) -> Result<StartTaskResult> {
        let task = self.require_task(&params.task_id).await?;
        if task.status != TaskStatus::Assigned {
            return Err(CoordError::invalid_state("start_task", task.status));
        }

        let branch = naming::branch_name(task.sequence, &task.title);
        let worktree = naming::worktree_path(self.git.repo_root(), task.sequence, &task.title);

        self.git.create_worktree(&worktree, &branch).await?;

        let updated = self
            .store
            .update_task(
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    branch_name: Some(branch.clone()),
                    worktree_path: Some(worktree.display().to_string()),
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        self.append_log(
            &task.id,
            ProgressEvent::Started,
            format!("Started in worktree on branch '{branch}'"),
            Some(json!({
                "branch_name": branch,
                "worktree_path": worktree.display().to_string(),
            })),
        )
        .await?;

        // Briefing: completed prerequisites double as code references.
        let completed_dependencies = self
            .store
            .get_dependencies(&task.id)
            .await?
            .into_iter()
            .filter(|d| d.status == TaskStatus::Completed)
            .map(|d| CompletedDependency {
                title: d.title,
                branch_name: d.branch_name,
            })
            .collect();
        let file_patterns = self.store.get_file_ownership(&task.id).await?;

        info!(task_id = %task.id, branch = %branch, "task started");
        Ok(StartTaskResult {
            description: updated.description.clone(),
            task: updated,
            file_patterns,
            completed_dependencies,
        })
    }

    /// Non-transitioning progress write. Optional `files_changed` is
    /// scanned against the exclusive patterns of other in-progress tasks
    /// in the same group; the rebase recommendation is best-effort and
    /// git errors there are swallowed.
    pub async fn update_progress(
        &self,
        params: UpdateProgressParams,
    ) -> Result<UpdateProgressResult> {
        let task = self.require_task(&params.task_id).await?;
        if !(0..=100).contains(&params.progress) {
            return Err(CoordError::Validation(format!(
                "progress must be between 0 and 100, got {}",
                params.progress
            )));
        }

        let updated = self
            .store
            .update_task(
                &task.id,
                TaskUpdate {
                    progress: Some(params.progress),
                    progress_note: params.note.clone(),
                    ..Default::default()
                },
            )
            .await?;

        let mut conflict_warnings = Vec::new();
        if let Some(files) = &params.files_changed {
            let others = self.in_progress_siblings(&updated).await?;
            conflict_warnings = ownership::check_file_conflicts(files, &others);
        }

        let rebase_recommended = match &updated.branch_name {
            Some(branch) => match self.git.latest_commit(Some(branch)).await {
                Ok(head) => self.git.trunk_ahead_of(&head).await.unwrap_or(false),
                Err(_) => false,
            },
            None => false,
        };

        self.append_log(
            &task.id,
            ProgressEvent::ProgressUpdate,
            match &params.note {
                Some(note) => format!("Progress {}%: {note}", params.progress),
                None => format!("Progress {}%", params.progress),
            },
            Some(json!({
                "progress": params.progress,
                "files_changed": params.files_changed,
            })),
        )
        .await?;

        Ok(UpdateProgressResult {
            task: updated,
            conflict_warnings,
            rebase_recommended,
        })
    }

    /// Guarded transition in_progress -> in_review. Downstream tasks are
    /// unblocked against the completed-or-in-review set: review-stage
    /// work may fan out before the merge lands because workers sit in
    /// separate worktrees and the merge stage catches textual collisions.
    pub async fn complete_task(&self, params: CompleteTaskParams) -> Result<CompleteTaskResult> {
        let task = self.require_task(&params.task_id).await?;
        if task.status != TaskStatus::InProgress {
            return Err(CoordError::invalid_state("complete_task", task.status));
        }

        let updated = self
            .store
            .update_task(
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::InReview),
                    completed_at: Some(Utc::now()),
                    progress: Some(100),
                    progress_note: Some(params.summary.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let unlocked = self.store.unblock_dependents(&task.id, true).await?;
        let unlocked_sequences: Vec<i64> = unlocked.iter().map(|t| t.sequence).collect();

        self.append_log(
            &task.id,
            ProgressEvent::Completed,
            format!("Ready for review: {}", params.summary),
            Some(json!({
                "files_changed": params.files_changed,
                "unlocked": unlocked_sequences,
            })),
        )
        .await?;

        info!(
            task_id = %task.id,
            unlocked = unlocked.len(),
            "task completed, awaiting merge"
        );
        Ok(CompleteTaskResult {
            task: updated,
            unlocked: unlocked
                .iter()
                .map(|t| TaskSummary::from_task(t, Some(true)))
                .collect(),
        })
    }

    /// Guarded transition in_review -> completed, or a conflict report.
    ///
    /// Requires the repository to be on trunk. On a clean merge the
    /// worktree and branch are removed best-effort (failures logged, not
    /// fatal) and unblocking reruns against the completed-only set. On
    /// conflict the task stays `in_review` and the merge is left in place
    /// for the caller to abort out-of-band.
    pub async fn merge_task(&self, params: MergeTaskParams) -> Result<MergeTaskResult> {
        if !self.git.on_trunk().await? {
            let current = self
                .git
                .current_branch()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| "detached HEAD".to_string());
            return Err(CoordError::Validation(format!(
                "merge_task requires the repository to be on trunk (main or master); currently on '{current}'"
            )));
        }

        let task = self.require_task(&params.task_id).await?;
        if task.status != TaskStatus::InReview {
            return Err(CoordError::invalid_state("merge_task", task.status));
        }
        let branch = task.branch_name.clone().ok_or_else(|| {
            CoordError::Internal(format!(
                "task '{}' is in_review but has no branch recorded",
                task.id
            ))
        })?;

        let outcome = self.git.merge(&branch, params.strategy).await?;

        if !outcome.success {
            let conflicts: Vec<ConflictEntry> = outcome
                .conflicts
                .iter()
                .map(|file| ConflictEntry {
                    file: file.clone(),
                    description: format!("Both trunk and branch '{branch}' modified {file}"),
                    suggestion: "Resolve the conflicted paths by hand, or abort the merge and rebase the task branch onto trunk before retrying".to_string(),
                    auto_resolvable: false,
                })
                .collect();

            self.append_log(
                &task.id,
                ProgressEvent::ConflictDetected,
                format!(
                    "Merge of '{branch}' stopped on {} conflicted file(s)",
                    conflicts.len()
                ),
                Some(json!({ "conflicts": outcome.conflicts })),
            )
            .await?;

            warn!(task_id = %task.id, files = conflicts.len(), "merge conflict");
            return Ok(MergeTaskResult {
                merge_result: MergeResultKind::Conflict,
                task: Some(task),
                unlocked: Vec::new(),
                conflicts,
            });
        }

        let updated = self
            .store
            .update_task(
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    merged_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        let mut cleaned = CleanupOutcome::default();
        if let Some(path) = updated.worktree_path.as_deref() {
            match self.remove_worktree_if_present(Path::new(path)).await {
                Ok(removed) => cleaned.worktree_removed = removed,
                Err(e) => warn!(task_id = %updated.id, error = %e, "worktree cleanup failed"),
            }
        }
        match self.git.delete_branch(&branch).await {
            Ok(()) => cleaned.branch_deleted = true,
            Err(e) => warn!(task_id = %updated.id, error = %e, "branch cleanup failed"),
        }

        let unlocked = self.store.unblock_dependents(&updated.id, false).await?;
        let unlocked_sequences: Vec<i64> = unlocked.iter().map(|t| t.sequence).collect();

        self.append_log(
            &updated.id,
            ProgressEvent::Merged,
            format!("Merged branch '{branch}' to trunk ({})", params.strategy),
            Some(json!({
                "strategy": params.strategy,
                "unlocked": unlocked_sequences,
                "worktree_removed": cleaned.worktree_removed,
                "branch_deleted": cleaned.branch_deleted,
            })),
        )
        .await?;

        info!(task_id = %updated.id, branch = %branch, "task merged to trunk");
        Ok(MergeTaskResult {
            merge_result: MergeResultKind::Clean,
            task: Some(updated),
            unlocked: unlocked
                .iter()
                .map(|t| TaskSummary::from_task(t, Some(true)))
                .collect(),
            conflicts: Vec::new(),
        })
    }

    /// Terminal transition from any non-terminal state to `failed`.
    /// Worktree and branch removal are best-effort; the response reports
    /// what was actually removed. `assigned_to` is retained for audit.
    pub async fn cleanup_task(&self, params: CleanupTaskParams) -> Result<CleanupTaskResult> {
        let task = self.require_task(&params.task_id).await?;
        if task.status.is_terminal() {
            return Err(CoordError::invalid_state("cleanup_task", task.status));
        }

        let mut cleaned = CleanupOutcome::default();
        if let Some(path) = task.worktree_path.as_deref() {
            match self.remove_worktree_if_present(Path::new(path)).await {
                Ok(removed) => cleaned.worktree_removed = removed,
                Err(e) => warn!(task_id = %task.id, error = %e, "worktree cleanup failed"),
            }
        }
        if let Some(branch) = task.branch_name.as_deref() {
            match self.git.delete_branch(branch).await {
                Ok(()) => cleaned.branch_deleted = true,
                Err(e) => warn!(task_id = %task.id, error = %e, "branch cleanup failed"),
            }
        }

        let updated = self
            .store
            .update_task(
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::Failed),
                    ..Default::default()
                },
            )
            .await?;

        let reason = params
            .reason
            .unwrap_or_else(|| "cleanup requested".to_string());
        self.append_log(
            &task.id,
            ProgressEvent::Failed,
            format!("Task failed: {reason}"),
            Some(json!({
                "reason": reason,
                "worktree_removed": cleaned.worktree_removed,
                "branch_deleted": cleaned.branch_deleted,
            })),
        )
        .await?;

        info!(task_id = %updated.id, %reason, "task cleaned up");
        Ok(CleanupTaskResult {
            task: updated,
            cleaned,
        })
    }

    /// Store connectivity probe
    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.store.health_check().await?;
        Ok(HealthStatus {
            status: "healthy".to_string(),
            database: true,
            protocol: true,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    // Internal helpers

    async fn require_task(&self, id: &str) -> Result<Task> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| CoordError::not_found_task(id))
    }

    async fn append_log(
        &self,
        task_id: &str,
        event: ProgressEvent,
        message: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<ProgressLog> {
        self.store
            .append_progress(NewProgressLog {
                id: new_id(),
                task_id: task_id.to_string(),
                event,
                message,
                metadata,
            })
            .await
    }

    /// Declared patterns of every other in-progress task in this group,
    /// labelled for conflict warnings
    async fn in_progress_siblings(&self, task: &Task) -> Result<Vec<TaskPatterns>> {
        let others = self
            .store
            .list_tasks(TaskFilter {
                group_id: Some(task.group_id.clone()),
                statuses: Some(vec![TaskStatus::InProgress]),
            })
            .await?;

        let mut patterns = Vec::new();
        for other in others.into_iter().filter(|o| o.id != task.id) {
            let claims = self
                .store
                .get_file_ownership(&other.id)
                .await?
                .into_iter()
                .map(|f| PatternClaim {
                    pattern: f.file_pattern,
                    ownership: f.ownership_type,
                })
                .collect();
            patterns.push(TaskPatterns {
                task_id: other.id.clone(),
                label: task_label(&other),
                patterns: claims,
            });
        }
        Ok(patterns)
    }

    /// Remove a worktree if git still lists it; returns whether anything
    /// was removed.
    async fn remove_worktree_if_present(&self, path: &Path) -> Result<bool> {
        if self.git.worktree_exists(path).await? {
            self.git.remove_worktree(path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
