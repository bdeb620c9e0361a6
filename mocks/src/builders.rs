//! Fluent builders for realistic test data.

use chrono::Utc;
use weft_core::models::{Priority, Task, TaskStatus};

/// Builder for [`Task`] values with sensible defaults
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        TaskBuilder {
            task: Task {
                id: "task-1".to_string(),
                group_id: "group-1".to_string(),
                sequence: 1,
                title: "Test Task".to_string(),
                description: "A task used in tests".to_string(),
                status: TaskStatus::Pending,
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
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn group(mut self, group_id: &str) -> Self {
        self.task.group_id = group_id.to_string();
        self
    }

    pub fn sequence(mut self, sequence: i64) -> Self {
        self.task.sequence = sequence;
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn assigned_to(mut self, agent: &str) -> Self {
        self.task.assigned_to = Some(agent.to_string());
        self
    }

    /// Fill in branch, worktree, and started_at the way `start_task` does
    pub fn started(mut self) -> Self {
        let slug = self.task.title.to_lowercase().replace(' ', "-");
        self.task.branch_name = Some(format!("task/task-{}-{}", self.task.sequence, slug));
        self.task.worktree_path = Some(format!(
            "/repo/.worktrees/task-{}-{}",
            self.task.sequence, slug
        ));
        self.task.started_at = Some(Utc::now());
        self.task.status = TaskStatus::InProgress;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}
