use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cohesive batch of tasks originating from one high-level requirement.
///
/// Groups are the unit of creation: one `create_tasks` invocation builds
/// one group and all of its tasks, dependencies, and file-pattern claims
/// atomically. Group status transitions are reserved for future use; the
/// MVP leaves every group `active`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskGroup {
    /// Opaque collision-resistant identifier (UUID-shaped)
    pub id: String,
    /// Short group title
    pub title: String,
    /// Longer description of the overall requirement
    pub description: String,
    /// Current lifecycle status
    pub status: GroupStatus,
    /// Creation timestamp, assigned by the store
    pub created_at: DateTime<Utc>,
}

/// Task group lifecycle status
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Active,
    Completed,
    Archived,
}

/// One unit of work assignable to one worker.
///
/// A task moves through the state machine below. The branch and worktree
/// are derived together in `start_task` and stay recorded afterwards for
/// audit, even once the git artifacts have been removed.
///
/// ```text
/// pending ── claim ──► assigned ── start ──► in_progress
///    ▲                                            │ complete
///    │ (last prerequisite completed)              ▼
/// blocked ◄───────────────────────────────── in_review
///                                                 │ merge (clean)
///                                                 ▼
///                                             completed
///
/// any non-terminal state ── cleanup ──► failed
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Opaque collision-resistant identifier (UUID-shaped)
    pub id: String,
    /// Owning group
    pub group_id: String,
    /// 1-based position within the group; stable and unique per group
    pub sequence: i64,
    /// Brief task title
    pub title: String,
    /// Detailed task requirements
    pub description: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Worker-facing priority
    pub priority: Priority,
    /// Worker identity; set on claim, retained on failure for audit
    pub assigned_to: Option<String>,
    /// Task branch (`task/task-{seq}-{slug}`), set by `start_task`
    pub branch_name: Option<String>,
    /// Isolated worktree path, set together with the branch
    pub worktree_path: Option<String>,
    /// Completion percentage, 0-100
    pub progress: i64,
    /// Free-form note attached to the latest progress update
    pub progress_note: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set when the worktree is created and work begins
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task enters review
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the task branch lands on trunk
    pub merged_at: Option<DateTime<Utc>>,
}

/// Task lifecycle states.
///
/// `Completed` and `Failed` are terminal; everything else is transient.
/// `Blocked` and `Pending` interconvert automatically as dependency
/// completion propagates.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for claiming (dependencies permitting)
    Pending,
    /// Waiting on incomplete prerequisites
    Blocked,
    /// Claimed by a worker, not yet started
    Assigned,
    /// Worker is active in its worktree
    InProgress,
    /// Work finished, awaiting merge to trunk
    InReview,
    /// Merged to trunk
    Completed,
    /// Abandoned or cleaned up
    Failed,
}

impl TaskStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Pending,
        TaskStatus::Blocked,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::InReview,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InReview => "in_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Worker-facing task priority
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Declared interest in a file region.
///
/// `Exclusive` means only the owning task may modify matching files while
/// it is in progress; `Shared` declares intent without forbidding others.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipType {
    #[default]
    Exclusive,
    Shared,
}

impl std::fmt::Display for OwnershipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OwnershipType::Exclusive => "exclusive",
            OwnershipType::Shared => "shared",
        };
        write!(f, "{s}")
    }
}

/// A worker's declared interest in a file pattern.
///
/// (task_id, file_pattern) is unique; re-adding the same pattern replaces
/// the ownership type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileOwnership {
    pub task_id: String,
    pub file_pattern: String,
    pub ownership_type: OwnershipType,
}

/// A file pattern claim before it is attached to a stored task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternClaim {
    pub pattern: String,
    #[serde(default)]
    pub ownership: OwnershipType,
}

/// A directed dependency edge: `task_id` requires `depends_on` to
/// complete first. Both tasks belong to the same group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDependency {
    pub task_id: String,
    pub depends_on: String,
}

/// Audit event kinds recorded in the progress log
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Claimed,
    Started,
    ProgressUpdate,
    Rebased,
    Completed,
    Failed,
    Merged,
    ConflictDetected,
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProgressEvent::Claimed => "claimed",
            ProgressEvent::Started => "started",
            ProgressEvent::ProgressUpdate => "progress_update",
            ProgressEvent::Rebased => "rebased",
            ProgressEvent::Completed => "completed",
            ProgressEvent::Failed => "failed",
            ProgressEvent::Merged => "merged",
            ProgressEvent::ConflictDetected => "conflict_detected",
        };
        write!(f, "{s}")
    }
}

/// An append-only audit record. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressLog {
    pub id: String,
    pub task_id: String,
    /// Insertion timestamp, assigned by the store
    pub timestamp: DateTime<Utc>,
    pub event: ProgressEvent,
    pub message: String,
    /// Structured metadata; round-trips through the store unchanged
    pub metadata: Option<serde_json::Value>,
}

// Data transfer objects

/// Fields for creating a new task group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTaskGroup {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Fields for creating a single task record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub id: String,
    pub group_id: String,
    pub sequence: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
}

/// A task plus its group-local wiring, consumed by the atomic
/// group-construction store operation. Dependency references use 1-based
/// sequence numbers, resolved to task ids inside the transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSeed {
    pub task: NewTask,
    pub depends_on_sequences: Vec<i64>,
    pub file_patterns: Vec<PatternClaim>,
}

/// Sparse update for an existing task: only provided fields are written.
/// An entirely empty update is a no-op that returns the current record.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub branch_name: Option<String>,
    pub worktree_path: Option<String>,
    pub progress: Option<i64>,
    pub progress_note: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self == &TaskUpdate::default()
    }
}

/// Filter criteria for querying tasks. Fields combine with AND logic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Restrict to one group
    pub group_id: Option<String>,
    /// Restrict to a set of statuses
    pub statuses: Option<Vec<TaskStatus>>,
}

/// Fields for appending a progress log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProgressLog {
    pub id: String,
    pub task_id: String,
    pub event: ProgressEvent,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

/// Fields for recording a file-pattern claim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewFileOwnership {
    pub task_id: String,
    pub file_pattern: String,
    pub ownership_type: OwnershipType,
}

/// An identical-pattern collision with another task currently in progress
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipConflict {
    pub task: Task,
    pub file_pattern: String,
    pub ownership_type: OwnershipType,
}

impl Task {
    /// Check whether the state machine admits a transition to `new_status`.
    ///
    /// The blocked/pending pair interconverts as dependency satisfaction
    /// propagates; every non-terminal state may fail via `cleanup_task`.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        use TaskStatus::*;

        match (self.status, new_status) {
            (current, new) if current == new => false,
            (Pending, Assigned | Blocked | Failed) => true,
            (Blocked, Pending | Failed) => true,
            (Assigned, InProgress | Failed) => true,
            (InProgress, InReview | Failed) => true,
            (InReview, Completed | Failed) => true,
            (Completed, _) => false,
            (Failed, _) => false,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_in(status: TaskStatus) -> Task {
        Task {
            id: "t-1".to_string(),
            group_id: "g-1".to_string(),
            sequence: 1,
            title: "Test Task".to_string(),
            description: "Test description".to_string(),
            status,
            priority: Priority::Medium,
            assigned_to: None,
            branch_name: None,
            worktree_path: None,
            progress: 0,
            progress_note: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            merged_at: None,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(task_in(TaskStatus::Pending).can_transition_to(TaskStatus::Assigned));
        assert!(task_in(TaskStatus::Assigned).can_transition_to(TaskStatus::InProgress));
        assert!(task_in(TaskStatus::InProgress).can_transition_to(TaskStatus::InReview));
        assert!(task_in(TaskStatus::InReview).can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_blocked_pending_interconvert() {
        assert!(task_in(TaskStatus::Pending).can_transition_to(TaskStatus::Blocked));
        assert!(task_in(TaskStatus::Blocked).can_transition_to(TaskStatus::Pending));
        assert!(!task_in(TaskStatus::Blocked).can_transition_to(TaskStatus::Assigned));
    }

    #[test]
    fn test_every_non_terminal_state_can_fail() {
        for status in TaskStatus::ALL {
            if status.is_terminal() {
                assert!(!task_in(status).can_transition_to(TaskStatus::Failed));
            } else {
                assert!(task_in(status).can_transition_to(TaskStatus::Failed));
            }
        }
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        for status in TaskStatus::ALL {
            assert!(!task_in(TaskStatus::Completed).can_transition_to(status));
            assert!(!task_in(TaskStatus::Failed).can_transition_to(status));
        }
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!task_in(TaskStatus::Pending).can_transition_to(TaskStatus::InProgress));
        assert!(!task_in(TaskStatus::Assigned).can_transition_to(TaskStatus::InReview));
        assert!(!task_in(TaskStatus::InProgress).can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_status_display_matches_wire_format() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(TaskStatus::InReview.to_string(), "in_review");
        assert_eq!(OwnershipType::Exclusive.to_string(), "exclusive");
        assert_eq!(ProgressEvent::ConflictDetected.to_string(), "conflict_detected");
    }

    #[test]
    fn test_empty_update_detection() {
        assert!(TaskUpdate::default().is_empty());
        let update = TaskUpdate {
            progress: Some(40),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
