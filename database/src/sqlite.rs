use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use weft_core::{
    dag,
    error::{CoordError, Result},
    models::{
        FileOwnership, GroupStatus, NewFileOwnership, NewProgressLog, NewTask, NewTaskGroup,
        OwnershipConflict, ProgressLog, Task, TaskFilter, TaskGroup, TaskSeed, TaskStatus,
        TaskUpdate,
    },
    store::TaskStore,
};

use crate::common::{
    event_to_string, group_status_to_string, ownership_to_string, row_to_group, row_to_ownership,
    row_to_progress, row_to_task, sqlx_error_to_coord_error, status_to_string, string_to_ownership,
    TASK_COLUMNS,
};

/// SQLite implementation of the [`TaskStore`] trait.
///
/// Uses a connection pool in WAL mode so readers are never blocked by the
/// single active writer, with foreign keys enforced and a busy timeout to
/// ride out short write contention. One instance per process, shared via
/// `Arc`.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Open (creating if missing) the store at `path`. The parent
    /// directory is created automatically.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CoordError::Configuration(format!(
                        "Failed to create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        Ok(Self { pool })
    }

    /// Fresh in-memory store for tests. Pinned to a single pooled
    /// connection: SQLite gives every new connection its own `:memory:`
    /// database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .journal_mode(SqliteJournalMode::Memory)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        Ok(Self { pool })
    }

    /// Apply pending migrations. The DDL is idempotent, so calling this
    /// on every open is safe.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoordError::Database(format!("Migration failed: {e}")))?;

        tracing::debug!("database migrations up to date");
        Ok(())
    }

    /// Direct pool access for custom test queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_group(&self, group: NewTaskGroup) -> Result<TaskGroup> {
        if group.title.trim().is_empty() {
            return Err(CoordError::Validation(
                "group title cannot be empty".to_string(),
            ));
        }

        let row = sqlx::query(
            "INSERT INTO task_groups (id, title, description, status, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id, title, description, status, created_at",
        )
        .bind(&group.id)
        .bind(&group.title)
        .bind(&group.description)
        .bind(group_status_to_string(GroupStatus::Active))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        row_to_group(&row)
    }

    async fn get_group(&self, id: &str) -> Result<Option<TaskGroup>> {
        let row = sqlx::query(
            "SELECT id, title, description, status, created_at FROM task_groups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        row.map(|r| row_to_group(&r)).transpose()
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        if task.title.trim().is_empty() {
            return Err(CoordError::Validation(
                "task title cannot be empty".to_string(),
            ));
        }

        let sql = format!(
            "INSERT INTO tasks (id, group_id, sequence, title, description, status, priority, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&task.id)
            .bind(&task.group_id)
            .bind(task.sequence)
            .bind(&task.title)
            .bind(&task.description)
            .bind(status_to_string(task.status))
            .bind(task.priority.to_string())
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        row_to_task(&row)
    }

    async fn create_group_with_tasks(
        &self,
        group: NewTaskGroup,
        seeds: Vec<TaskSeed>,
    ) -> Result<(TaskGroup, Vec<Task>)> {
        if group.title.trim().is_empty() {
            return Err(CoordError::Validation(
                "group title cannot be empty".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_coord_error)?;
        let now = Utc::now();

        let group_row = sqlx::query(
            "INSERT INTO task_groups (id, title, description, status, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id, title, description, status, created_at",
        )
        .bind(&group.id)
        .bind(&group.title)
        .bind(&group.description)
        .bind(group_status_to_string(GroupStatus::Active))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;
        let group = row_to_group(&group_row)?;

        let insert_task_sql = format!(
            "INSERT INTO tasks (id, group_id, sequence, title, description, status, priority, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {TASK_COLUMNS}"
        );

        let mut sequence_to_id: HashMap<i64, String> = HashMap::new();
        let mut tasks = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            let task = &seed.task;
            if task.title.trim().is_empty() {
                return Err(CoordError::Validation(
                    "task title cannot be empty".to_string(),
                ));
            }
            let row = sqlx::query(&insert_task_sql)
                .bind(&task.id)
                .bind(&task.group_id)
                .bind(task.sequence)
                .bind(&task.title)
                .bind(&task.description)
                .bind(status_to_string(task.status))
                .bind(task.priority.to_string())
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(sqlx_error_to_coord_error)?;
            tasks.push(row_to_task(&row)?);
            sequence_to_id.insert(task.sequence, task.id.clone());
        }

        for seed in &seeds {
            for dep_sequence in &seed.depends_on_sequences {
                // The service has already warned about unknown
                // references; anything unresolved here is skipped.
                if let Some(dep_id) = sequence_to_id.get(dep_sequence) {
                    sqlx::query(
                        "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on) VALUES (?, ?)",
                    )
                    .bind(&seed.task.id)
                    .bind(dep_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(sqlx_error_to_coord_error)?;
                }
            }

            for claim in &seed.file_patterns {
                sqlx::query(
                    "INSERT OR REPLACE INTO task_file_ownership (task_id, file_pattern, ownership_type) \
                     VALUES (?, ?, ?)",
                )
                .bind(&seed.task.id)
                .bind(&claim.pattern)
                .bind(ownership_to_string(claim.ownership))
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error_to_coord_error)?;
            }
        }

        tx.commit().await.map_err(sqlx_error_to_coord_error)?;

        tasks.sort_by_key(|t| t.sequence);
        Ok((group, tasks))
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    async fn get_task_by_sequence(&self, group_id: &str, sequence: i64) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE group_id = ? AND sequence = ?");
        let row = sqlx::query(&sql)
            .bind(group_id)
            .bind(sequence)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        // An explicitly empty status set matches nothing.
        if matches!(&filter.statuses, Some(statuses) if statuses.is_empty()) {
            return Ok(Vec::new());
        }

        let mut query_builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks"));

        let mut has_conditions = false;
        if let Some(ref group_id) = filter.group_id {
            query_builder.push(" WHERE group_id = ");
            query_builder.push_bind(group_id.clone());
            has_conditions = true;
        }

        if let Some(ref statuses) = filter.statuses {
            query_builder.push(if has_conditions { " AND " } else { " WHERE " });
            query_builder.push("status IN (");
            let mut separated = query_builder.separated(", ");
            for status in statuses {
                separated.push_bind(status_to_string(*status));
            }
            query_builder.push(")");
        }

        query_builder.push(" ORDER BY group_id, sequence ASC");

        let rows = query_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        rows.iter().map(row_to_task).collect()
    }

    async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task> {
        let existing = self.get_task(id).await?;
        let Some(existing) = existing else {
            return Err(CoordError::not_found_task(id));
        };

        // A no-op update returns the current state unchanged.
        if update.is_empty() {
            return Ok(existing);
        }

        let mut query_builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("UPDATE tasks SET ");
        let mut has_updates = false;

        macro_rules! push_field {
            ($field:literal, $value:expr) => {
                if has_updates {
                    query_builder.push(", ");
                }
                query_builder.push(concat!($field, " = "));
                query_builder.push_bind($value);
                has_updates = true;
            };
        }

        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(CoordError::Validation(
                    "task title cannot be empty".to_string(),
                ));
            }
            push_field!("title", title.clone());
        }
        if let Some(description) = &update.description {
            push_field!("description", description.clone());
        }
        if let Some(status) = update.status {
            push_field!("status", status_to_string(status));
        }
        if let Some(priority) = update.priority {
            push_field!("priority", priority.to_string());
        }
        if let Some(assigned_to) = &update.assigned_to {
            push_field!("assigned_to", assigned_to.clone());
        }
        if let Some(branch_name) = &update.branch_name {
            push_field!("branch_name", branch_name.clone());
        }
        if let Some(worktree_path) = &update.worktree_path {
            push_field!("worktree_path", worktree_path.clone());
        }
        if let Some(progress) = update.progress {
            push_field!("progress", progress);
        }
        if let Some(progress_note) = &update.progress_note {
            push_field!("progress_note", progress_note.clone());
        }
        if let Some(started_at) = update.started_at {
            push_field!("started_at", started_at);
        }
        if let Some(completed_at) = update.completed_at {
            push_field!("completed_at", completed_at);
        }
        if let Some(merged_at) = update.merged_at {
            push_field!("merged_at", merged_at);
        }

        query_builder.push(" WHERE id = ");
        query_builder.push_bind(id);
        query_builder.push(format!(" RETURNING {TASK_COLUMNS}"));

        let row = query_builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        row_to_task(&row)
    }

    async fn try_claim(&self, id: &str, agent_id: &str) -> Result<bool> {
        // Single guarded UPDATE: of any number of concurrent claimants,
        // exactly one observes rows_affected == 1.
        let result = sqlx::query(
            "UPDATE tasks SET status = 'assigned', assigned_to = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(agent_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO task_dependencies (task_id, depends_on) VALUES (?, ?)")
            .bind(task_id)
            .bind(depends_on)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;
        Ok(())
    }

    async fn get_dependencies(&self, task_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE id IN (SELECT depends_on FROM task_dependencies WHERE task_id = ?) \
             ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        rows.iter().map(row_to_task).collect()
    }

    async fn get_dependents(&self, task_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE id IN (SELECT task_id FROM task_dependencies WHERE depends_on = ?) \
             ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        rows.iter().map(row_to_task).collect()
    }

    async fn add_file_ownership(&self, ownership: NewFileOwnership) -> Result<FileOwnership> {
        let row = sqlx::query(
            "INSERT OR REPLACE INTO task_file_ownership (task_id, file_pattern, ownership_type) \
             VALUES (?, ?, ?) RETURNING task_id, file_pattern, ownership_type",
        )
        .bind(&ownership.task_id)
        .bind(&ownership.file_pattern)
        .bind(ownership_to_string(ownership.ownership_type))
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        row_to_ownership(&row)
    }

    async fn get_file_ownership(&self, task_id: &str) -> Result<Vec<FileOwnership>> {
        let rows = sqlx::query(
            "SELECT task_id, file_pattern, ownership_type FROM task_file_ownership \
             WHERE task_id = ? ORDER BY file_pattern ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        rows.iter().map(row_to_ownership).collect()
    }

    async fn find_ownership_conflicts(&self, task_id: &str) -> Result<Vec<OwnershipConflict>> {
        let sql = "SELECT t.*, theirs.file_pattern AS conflict_pattern, \
                          theirs.ownership_type AS conflict_ownership \
                   FROM task_file_ownership mine \
                   JOIN task_file_ownership theirs \
                        ON theirs.file_pattern = mine.file_pattern \
                       AND theirs.task_id != mine.task_id \
                   JOIN tasks t ON t.id = theirs.task_id \
                   WHERE mine.task_id = ? AND t.status = 'in_progress' \
                   ORDER BY t.sequence ASC, theirs.file_pattern ASC";
        let rows = sqlx::query(sql)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        let mut conflicts = Vec::with_capacity(rows.len());
        for row in &rows {
            let pattern: String = row.get("conflict_pattern");
            let ownership_str: String = row.get("conflict_ownership");
            conflicts.push(OwnershipConflict {
                task: row_to_task(row)?,
                file_pattern: pattern,
                ownership_type: string_to_ownership(&ownership_str)?,
            });
        }
        Ok(conflicts)
    }

    async fn append_progress(&self, entry: NewProgressLog) -> Result<ProgressLog> {
        let metadata_text = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CoordError::Serialization(e.to_string()))?;

        let row = sqlx::query(
            "INSERT INTO progress_logs (id, task_id, timestamp, event, message, metadata) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id, task_id, timestamp, event, message, metadata",
        )
        .bind(&entry.id)
        .bind(&entry.task_id)
        .bind(Utc::now())
        .bind(event_to_string(entry.event))
        .bind(&entry.message)
        .bind(metadata_text)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        row_to_progress(&row)
    }

    async fn list_progress(&self, task_id: &str) -> Result<Vec<ProgressLog>> {
        // rowid breaks timestamp ties so entries written within one
        // operation keep their insertion order.
        let rows = sqlx::query(
            "SELECT id, task_id, timestamp, event, message, metadata FROM progress_logs \
             WHERE task_id = ? ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        rows.iter().map(row_to_progress).collect()
    }

    async fn unblock_dependents(
        &self,
        completed_task_id: &str,
        include_in_review: bool,
    ) -> Result<Vec<Task>> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_coord_error)?;

        let group_id: Option<String> =
            sqlx::query_scalar("SELECT group_id FROM tasks WHERE id = ?")
                .bind(completed_task_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sqlx_error_to_coord_error)?;
        let Some(group_id) = group_id else {
            return Err(CoordError::not_found_task(completed_task_id));
        };

        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE group_id = ?");
        let rows = sqlx::query(&sql)
            .bind(&group_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(sqlx_error_to_coord_error)?;
        let tasks: Vec<Task> = rows.iter().map(row_to_task).collect::<Result<_>>()?;

        let dep_rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT d.task_id, d.depends_on FROM task_dependencies d \
             JOIN tasks t ON t.id = d.task_id WHERE t.group_id = ?",
        )
        .bind(&group_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for (task_id, depends_on) in dep_rows {
            deps.entry(task_id).or_default().push(depends_on);
        }

        let completed: HashSet<String> = tasks
            .iter()
            .filter(|t| {
                t.status == TaskStatus::Completed
                    || (include_in_review && t.status == TaskStatus::InReview)
            })
            .map(|t| t.id.clone())
            .collect();
        let blocked: HashSet<&str> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .map(|t| t.id.as_str())
            .collect();

        let unlocked = dag::unlocked_by(completed_task_id, &deps, &completed);

        let update_sql = format!(
            "UPDATE tasks SET status = 'pending' WHERE id = ? RETURNING {TASK_COLUMNS}"
        );
        let mut flipped = Vec::new();
        for id in unlocked.iter().filter(|id| blocked.contains(id.as_str())) {
            let row = sqlx::query(&update_sql)
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(sqlx_error_to_coord_error)?;
            flipped.push(row_to_task(&row)?);
        }

        tx.commit().await.map_err(sqlx_error_to_coord_error)?;

        if !flipped.is_empty() {
            tracing::info!(
                completed_task_id,
                unblocked = flipped.len(),
                "dependency completion unblocked tasks"
            );
        }
        flipped.sort_by_key(|t| t.sequence);
        Ok(flipped)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;
        Ok(())
    }
}
