//! Row conversion and error mapping shared by the SQLite store.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use weft_core::{
    error::{CoordError, Result},
    models::{
        FileOwnership, GroupStatus, OwnershipType, ProgressEvent, ProgressLog, Task, TaskGroup,
        TaskStatus,
    },
};

/// Convert TaskStatus to its stored string form
pub fn status_to_string(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Assigned => "assigned",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::InReview => "in_review",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

/// Convert a stored string back into a TaskStatus
pub fn string_to_status(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "blocked" => Ok(TaskStatus::Blocked),
        "assigned" => Ok(TaskStatus::Assigned),
        "in_progress" => Ok(TaskStatus::InProgress),
        "in_review" => Ok(TaskStatus::InReview),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        _ => Err(CoordError::Database(format!(
            "Invalid task status in database: {s}"
        ))),
    }
}

pub fn group_status_to_string(status: GroupStatus) -> &'static str {
    match status {
        GroupStatus::Active => "active",
        GroupStatus::Completed => "completed",
        GroupStatus::Archived => "archived",
    }
}

pub fn string_to_group_status(s: &str) -> Result<GroupStatus> {
    match s {
        "active" => Ok(GroupStatus::Active),
        "completed" => Ok(GroupStatus::Completed),
        "archived" => Ok(GroupStatus::Archived),
        _ => Err(CoordError::Database(format!(
            "Invalid group status in database: {s}"
        ))),
    }
}

pub fn ownership_to_string(ownership: OwnershipType) -> &'static str {
    match ownership {
        OwnershipType::Exclusive => "exclusive",
        OwnershipType::Shared => "shared",
    }
}

pub fn string_to_ownership(s: &str) -> Result<OwnershipType> {
    match s {
        "exclusive" => Ok(OwnershipType::Exclusive),
        "shared" => Ok(OwnershipType::Shared),
        _ => Err(CoordError::Database(format!(
            "Invalid ownership type in database: {s}"
        ))),
    }
}

pub fn event_to_string(event: ProgressEvent) -> &'static str {
    match event {
        ProgressEvent::Claimed => "claimed",
        ProgressEvent::Started => "started",
        ProgressEvent::ProgressUpdate => "progress_update",
        ProgressEvent::Rebased => "rebased",
        ProgressEvent::Completed => "completed",
        ProgressEvent::Failed => "failed",
        ProgressEvent::Merged => "merged",
        ProgressEvent::ConflictDetected => "conflict_detected",
    }
}

pub fn string_to_event(s: &str) -> Result<ProgressEvent> {
    match s {
        "claimed" => Ok(ProgressEvent::Claimed),
        "started" => Ok(ProgressEvent::Started),
        "progress_update" => Ok(ProgressEvent::ProgressUpdate),
        "rebased" => Ok(ProgressEvent::Rebased),
        "completed" => Ok(ProgressEvent::Completed),
        "failed" => Ok(ProgressEvent::Failed),
        "merged" => Ok(ProgressEvent::Merged),
        "conflict_detected" => Ok(ProgressEvent::ConflictDetected),
        _ => Err(CoordError::Database(format!(
            "Invalid progress event in database: {s}"
        ))),
    }
}

/// Column list shared by every task SELECT/RETURNING
pub const TASK_COLUMNS: &str = "id, group_id, sequence, title, description, status, priority, \
     assigned_to, branch_name, worktree_path, progress, progress_note, \
     created_at, started_at, completed_at, merged_at";

pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let priority_str: String = row.get("priority");
    let priority = match priority_str.as_str() {
        "high" => weft_core::models::Priority::High,
        "medium" => weft_core::models::Priority::Medium,
        "low" => weft_core::models::Priority::Low,
        other => {
            return Err(CoordError::Database(format!(
                "Invalid priority in database: {other}"
            )))
        }
    };

    let created_at: DateTime<Utc> = row.get("created_at");
    let started_at: Option<DateTime<Utc>> = row.get("started_at");
    let completed_at: Option<DateTime<Utc>> = row.get("completed_at");
    let merged_at: Option<DateTime<Utc>> = row.get("merged_at");

    Ok(Task {
        id: row.get("id"),
        group_id: row.get("group_id"),
        sequence: row.get("sequence"),
        title: row.get("title"),
        description: row.get("description"),
        status: string_to_status(&status_str)?,
        priority,
        assigned_to: row.get("assigned_to"),
        branch_name: row.get("branch_name"),
        worktree_path: row.get("worktree_path"),
        progress: row.get("progress"),
        progress_note: row.get("progress_note"),
        created_at,
        started_at,
        completed_at,
        merged_at,
    })
}

pub fn row_to_group(row: &SqliteRow) -> Result<TaskGroup> {
    let status_str: String = row.get("status");
    let created_at: DateTime<Utc> = row.get("created_at");

    Ok(TaskGroup {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: string_to_group_status(&status_str)?,
        created_at,
    })
}

pub fn row_to_ownership(row: &SqliteRow) -> Result<FileOwnership> {
    let ownership_str: String = row.get("ownership_type");
    Ok(FileOwnership {
        task_id: row.get("task_id"),
        file_pattern: row.get("file_pattern"),
        ownership_type: string_to_ownership(&ownership_str)?,
    })
}

/// Restore a progress row, including the structured metadata blob
pub fn row_to_progress(row: &SqliteRow) -> Result<ProgressLog> {
    let event_str: String = row.get("event");
    let timestamp: DateTime<Utc> = row.get("timestamp");
    let metadata_text: Option<String> = row.get("metadata");
    let metadata = match metadata_text {
        Some(text) => Some(
            serde_json::from_str(&text)
                .map_err(|e| CoordError::Database(format!("Corrupt progress metadata: {e}")))?,
        ),
        None => None,
    };

    Ok(ProgressLog {
        id: row.get("id"),
        task_id: row.get("task_id"),
        timestamp,
        event: string_to_event(&event_str)?,
        message: row.get("message"),
        metadata,
    })
}

/// Convert a sqlx error into a CoordError, recognizing the uniqueness
/// constraints the schema relies on.
pub fn sqlx_error_to_coord_error(err: sqlx::Error) -> CoordError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                if message.contains("tasks.group_id") && message.contains("tasks.sequence") {
                    CoordError::Validation(
                        "sequence already used within this task group".to_string(),
                    )
                } else if message.contains("tasks.id") {
                    CoordError::Validation("task id already exists".to_string())
                } else if message.contains("task_groups.id") {
                    CoordError::Validation("task group id already exists".to_string())
                } else {
                    CoordError::Validation(format!("uniqueness violation: {message}"))
                }
            } else {
                CoordError::Database(format!("Database constraint error: {message}"))
            }
        }
        sqlx::Error::RowNotFound => {
            CoordError::Database("Unexpected RowNotFound error".to_string())
        }
        sqlx::Error::PoolTimedOut => CoordError::Database("Connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => CoordError::Database(format!("Database I/O error: {io_err}")),
        _ => CoordError::Database(format!("Database operation failed: {err}")),
    }
}
