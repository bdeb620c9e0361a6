//! Parameter and response types for the nine coordinator operations.
//!
//! These are the wire-facing shapes: the transport layer deserializes
//! tool arguments into the `*Params` structs and serializes the
//! `*Result` structs back. They reuse the domain models directly where
//! possible to avoid duplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    git::MergeStrategy,
    models::{FileOwnership, OwnershipType, Priority, ProgressLog, Task, TaskStatus},
};

// Parameters

/// Parameters for `create_tasks`: the group metadata plus the structured
/// task list the agent has already split out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTasksParams {
    /// Group title
    pub title: String,
    /// Group description
    #[serde(default)]
    pub description: String,
    pub tasks: Vec<TaskSpec>,
}

/// One task in a `create_tasks` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// 1-based sequence numbers of prerequisite tasks in the same request
    #[serde(default)]
    pub depends_on: Vec<i64>,
    #[serde(default)]
    pub file_patterns: Vec<FilePatternSpec>,
}

/// A declared file pattern in a `create_tasks` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePatternSpec {
    pub pattern: String,
    #[serde(default)]
    pub ownership_type: OwnershipType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTasksParams {
    pub group_id: Option<String>,
    pub status: Option<Vec<TaskStatus>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTaskParams {
    pub task_id: String,
    /// Worker identity; generated when absent
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTaskParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProgressParams {
    pub task_id: String,
    /// Completion percentage, 0-100
    pub progress: i64,
    #[serde(default)]
    pub note: Option<String>,
    /// Files touched so far, scanned against other tasks' exclusive patterns
    #[serde(default)]
    pub files_changed: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskParams {
    pub task_id: String,
    pub summary: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeTaskParams {
    pub task_id: String,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupTaskParams {
    pub task_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

// Responses

/// Compact task projection used in lists and unlock reports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSummary {
    pub id: String,
    pub sequence: i64,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Reported only for `pending` tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_start: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl TaskSummary {
    pub fn from_task(task: &Task, can_start: Option<bool>) -> Self {
        TaskSummary {
            id: task.id.clone(),
            sequence: task.sequence,
            title: task.title.clone(),
            status: task.status,
            priority: task.priority,
            can_start,
            assigned_to: task.assigned_to.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTasksResult {
    pub group_id: String,
    pub tasks: Vec<TaskSummary>,
    pub warnings: Vec<String>,
}

/// Per-status tallies returned by `list_tasks`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub in_review: usize,
    pub completed: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResult {
    pub tasks: Vec<TaskSummary>,
    pub summary: StatusCounts,
}

/// Dependency projection in `get_task`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub sequence: i64,
    pub title: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub dependencies: Vec<DependencyInfo>,
    pub file_ownership: Vec<FileOwnership>,
    pub progress_log: Vec<ProgressLog>,
}

/// Outcome of a claim attempt. Precondition failures are soft: the
/// operation declines without mutating and the worker may retry later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTaskResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClaimTaskResult {
    pub fn granted(task: Task, agent_id: String) -> Self {
        ClaimTaskResult {
            success: true,
            task: Some(task),
            agent_id: Some(agent_id),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        ClaimTaskResult {
            success: false,
            task: None,
            agent_id: None,
            error: Some(error.into()),
        }
    }
}

/// A completed prerequisite offered to the worker as a code reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedDependency {
    pub title: String,
    pub branch_name: Option<String>,
}

/// Worker briefing returned by `start_task`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTaskResult {
    pub task: Task,
    pub description: String,
    pub file_patterns: Vec<FileOwnership>,
    pub completed_dependencies: Vec<CompletedDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProgressResult {
    pub task: Task,
    pub conflict_warnings: Vec<String>,
    /// Best-effort: true when trunk has advanced past the task branch
    pub rebase_recommended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskResult {
    pub task: Task,
    pub unlocked: Vec<TaskSummary>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeResultKind {
    Clean,
    Conflict,
}

/// One conflicted path in a failed merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub file: String,
    pub description: String,
    pub suggestion: String,
    pub auto_resolvable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeTaskResult {
    pub merge_result: MergeResultKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unlocked: Vec<TaskSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conflicts: Vec<ConflictEntry>,
}

/// What the git driver actually removed during cleanup
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub worktree_removed: bool,
    pub branch_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupTaskResult {
    pub task: Task,
    pub cleaned: CleanupOutcome,
}

/// Health probe response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub database: bool,
    pub protocol: bool,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus {
            status: "unknown".to_string(),
            database: false,
            protocol: false,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_spec_defaults() {
        let spec: TaskSpec = serde_json::from_str(r#"{"title": "DB Schema"}"#).unwrap();
        assert_eq!(spec.priority, Priority::Medium);
        assert!(spec.depends_on.is_empty());
        assert!(spec.file_patterns.is_empty());
        assert_eq!(spec.description, "");
    }

    #[test]
    fn test_file_pattern_defaults_to_exclusive() {
        let spec: FilePatternSpec =
            serde_json::from_str(r#"{"pattern": "src/db/**"}"#).unwrap();
        assert_eq!(spec.ownership_type, OwnershipType::Exclusive);
    }

    #[test]
    fn test_merge_params_default_strategy() {
        let params: MergeTaskParams =
            serde_json::from_str(r#"{"task_id": "t-1"}"#).unwrap();
        assert_eq!(params.strategy, MergeStrategy::Squash);
    }

    #[test]
    fn test_claim_result_shapes() {
        let rejected = ClaimTaskResult::rejected("Task is assigned");
        assert!(!rejected.success);
        assert!(rejected.task.is_none());
        let value = serde_json::to_value(&rejected).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("task").is_none());
    }

    #[test]
    fn test_can_start_omitted_when_absent() {
        let summary = TaskSummary {
            id: "t".into(),
            sequence: 1,
            title: "x".into(),
            status: TaskStatus::Completed,
            priority: Priority::Medium,
            can_start: None,
            assigned_to: None,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("can_start").is_none());
    }
}
