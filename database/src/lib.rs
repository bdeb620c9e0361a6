//! SQLite persistence for the weft coordination engine.
//!
//! [`SqliteTaskStore`] implements the `TaskStore` trait from `weft-core`
//! over a pooled SQLite database in WAL mode. The schema is created by
//! idempotent migrations on open.

mod common;
mod sqlite;

use std::env;
use std::path::PathBuf;

pub use sqlite::SqliteTaskStore;

/// Environment variable overriding the store location
pub const TASK_DB_PATH_ENV: &str = "TASK_DB_PATH";

/// Default store location relative to the working directory
pub const DEFAULT_DB_PATH: &str = ".tasks/tasks.db";

/// Resolve the store path: `TASK_DB_PATH` when set, otherwise
/// `{cwd}/.tasks/tasks.db`.
pub fn resolve_database_path() -> PathBuf {
    match env::var(TASK_DB_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_DB_PATH),
    }
}
