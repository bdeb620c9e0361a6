//! weft core library
//!
//! Foundational domain models, business logic, and trait interfaces for
//! the weft task coordinator. All other crates depend on the types and
//! interfaces defined here.
//!
//! # Architecture
//!
//! - [`models`] - domain models (Task, TaskGroup, ProgressLog, ...)
//! - [`error`] - error types and result handling
//! - [`dag`] - cycle detection, readiness, unblock propagation
//! - [`ownership`] - file-pattern overlap decisions and conflict reports
//! - [`naming`] - branch/worktree name derivation
//! - [`store`] - persistence trait implemented by the database crate
//! - [`git`] - git driver trait implemented by the git crate
//! - [`service`] - the task state machine composing all of the above
//! - [`protocol`] - parameter and response types for the tool surface

pub mod dag;
pub mod error;
pub mod git;
pub mod models;
pub mod naming;
pub mod ownership;
pub mod protocol;
pub mod service;
pub mod store;

// Re-export commonly used types at the crate root for convenience
pub use error::{CoordError, Result};
pub use git::{GitDriver, MergeOutcome, MergeStrategy};
pub use models::{
    FileOwnership, GroupStatus, NewFileOwnership, NewProgressLog, NewTask, NewTaskGroup,
    OwnershipConflict, OwnershipType, PatternClaim, Priority, ProgressEvent, ProgressLog, Task,
    TaskDependency, TaskFilter, TaskGroup, TaskSeed, TaskStatus, TaskUpdate,
};
pub use protocol::{
    ClaimTaskParams, ClaimTaskResult, CleanupOutcome, CleanupTaskParams, CleanupTaskResult,
    CompleteTaskParams, CompleteTaskResult, CreateTasksParams, CreateTasksResult, GetTaskParams,
    HealthStatus, ListTasksParams, ListTasksResult, MergeResultKind, MergeTaskParams,
    MergeTaskResult, StartTaskParams, StartTaskResult, StatusCounts, TaskDetail, TaskSpec,
    TaskSummary, UpdateProgressParams, UpdateProgressResult,
};
pub use service::TaskService;
pub use store::TaskStore;

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
