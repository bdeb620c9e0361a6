use async_trait::async_trait;

use crate::{
    error::Result,
    models::{
        FileOwnership, NewFileOwnership, NewProgressLog, NewTask, NewTaskGroup, OwnershipConflict,
        ProgressLog, Task, TaskFilter, TaskGroup, TaskSeed, TaskUpdate,
    },
};

/// Durable, transactional persistence for groups, tasks, dependencies,
/// file-ownership claims, and progress events.
///
/// Implementations must be safe under concurrent access: readers may run
/// during a writer, writers serialize, and the compound operations
/// ([`create_group_with_tasks`](TaskStore::create_group_with_tasks),
/// [`try_claim`](TaskStore::try_claim),
/// [`unblock_dependents`](TaskStore::unblock_dependents)) each execute as
/// one atomic unit so that interleaved callers observe only committed
/// states.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a new task group
    ///
    /// # Returns
    /// * `Ok(TaskGroup)` - the created group with store-assigned timestamp
    /// * `Err(CoordError::Validation)` - duplicate group id
    /// * `Err(CoordError::Database)` - the store operation failed
    async fn create_group(&self, group: NewTaskGroup) -> Result<TaskGroup>;

    /// Get a group by id
    async fn get_group(&self, id: &str) -> Result<Option<TaskGroup>>;

    /// Create a single task record
    ///
    /// # Returns
    /// * `Ok(Task)` - the created task
    /// * `Err(CoordError::Validation)` - duplicate task id, or sequence
    ///   collision within the group
    /// * `Err(CoordError::Database)` - the store operation failed
    async fn create_task(&self, task: NewTask) -> Result<Task>;

    /// Materialize a whole group atomically: the group row, every task,
    /// the dependency edges (given as 1-based sequence references,
    /// resolved inside the transaction; unknown sequences are skipped),
    /// and the file-pattern claims. Either everything commits or nothing
    /// does.
    ///
    /// # Returns
    /// * `Ok((TaskGroup, Vec<Task>))` - tasks ordered by sequence
    async fn create_group_with_tasks(
        &self,
        group: NewTaskGroup,
        tasks: Vec<TaskSeed>,
    ) -> Result<(TaskGroup, Vec<Task>)>;

    /// Get a task by id
    async fn get_task(&self, id: &str) -> Result<Option<Task>>;

    /// Get a task by its (group, sequence) coordinate
    async fn get_task_by_sequence(&self, group_id: &str, sequence: i64) -> Result<Option<Task>>;

    /// List tasks matching the filter, ordered by sequence ascending
    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Update only the provided fields of a task. An empty update is a
    /// no-op that returns the current record.
    ///
    /// # Returns
    /// * `Ok(Task)` - the updated task
    /// * `Err(CoordError::NotFound)` - no task with that id
    async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task>;

    /// Atomically transition a task from `pending` to `assigned` and
    /// record the worker identity. Under concurrent claims on the same
    /// task exactly one caller observes `true`; every other caller gets
    /// `false` and can re-read the post-write state.
    async fn try_claim(&self, id: &str, agent_id: &str) -> Result<bool>;

    /// Insert a dependency edge; duplicate edges collapse (idempotent)
    async fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<()>;

    /// Prerequisite tasks of `task_id`, ordered by sequence
    async fn get_dependencies(&self, task_id: &str) -> Result<Vec<Task>>;

    /// Tasks that list `task_id` as a prerequisite, ordered by sequence
    async fn get_dependents(&self, task_id: &str) -> Result<Vec<Task>>;

    /// Record a file-pattern claim; replaces on (task_id, pattern) conflict
    async fn add_file_ownership(&self, ownership: NewFileOwnership) -> Result<FileOwnership>;

    /// All file-pattern claims of a task
    async fn get_file_ownership(&self, task_id: &str) -> Result<Vec<FileOwnership>>;

    /// Every pattern of `task_id` held *identically* by another task
    /// whose status is `in_progress`. Non-identical overlap is the
    /// ownership engine's concern, not the store's.
    async fn find_ownership_conflicts(&self, task_id: &str) -> Result<Vec<OwnershipConflict>>;

    /// Append an audit record. Timestamps are assigned at insert; entries
    /// are never updated or deleted.
    async fn append_progress(&self, entry: NewProgressLog) -> Result<ProgressLog>;

    /// Progress log of a task, ordered by timestamp ascending (insertion
    /// order preserved for entries written in the same instant)
    async fn list_progress(&self, task_id: &str) -> Result<Vec<ProgressLog>>;

    /// Flip to `pending` every `blocked` task in the group of
    /// `completed_task_id` that the completion newly unblocks.
    ///
    /// Runs as one transaction: the group's tasks and edges are read, the
    /// completed set is every task in `completed` status (plus
    /// `in_review` when `include_in_review` is set, plus the completed
    /// task itself), the DAG engine decides which direct dependents now
    /// satisfy all their prerequisites, and those rows are updated before
    /// commit. Returns the flipped tasks.
    async fn unblock_dependents(
        &self,
        completed_task_id: &str,
        include_in_review: bool,
    ) -> Result<Vec<Task>>;

    /// Store connectivity probe
    ///
    /// # Returns
    /// * `Ok(())` - store is reachable
    /// * `Err(CoordError::Database)` - store is unhealthy
    async fn health_check(&self) -> Result<()>;
}
