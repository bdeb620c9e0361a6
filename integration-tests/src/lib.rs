//! Shared fixtures for the end-to-end coordination scenarios.

use std::path::Path;
use std::sync::Arc;

use weft_core::{
    protocol::{ClaimTaskParams, StartTaskParams},
    Task, TaskService,
};
use weft_database::SqliteTaskStore;
use weft_mocks::MockGitDriver;

pub type TestService = TaskService<SqliteTaskStore, MockGitDriver>;

/// Service over a fresh in-memory store and a scriptable git driver
pub async fn service_in_memory() -> (TestService, Arc<SqliteTaskStore>, Arc<MockGitDriver>) {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    let store = Arc::new(store);
    let git = Arc::new(MockGitDriver::new());
    (TaskService::new(store.clone(), git.clone()), store, git)
}

/// Service over a file-backed store, for tests that need real pooled
/// concurrency
pub async fn service_at(db_path: &Path) -> (TestService, Arc<SqliteTaskStore>, Arc<MockGitDriver>) {
    let store = SqliteTaskStore::open(db_path).await.unwrap();
    store.migrate().await.unwrap();
    let store = Arc::new(store);
    let git = Arc::new(MockGitDriver::new());
    (TaskService::new(store.clone(), git.clone()), store, git)
}

/// Claim and start a task, returning the in-progress record
pub async fn drive_to_in_progress(service: &TestService, task_id: &str) -> Task {
    let claim = service
        .claim_task(ClaimTaskParams {
            task_id: task_id.to_string(),
            agent_id: None,
        })
        .await
        .unwrap();
    assert!(claim.success, "claim failed: {:?}", claim.error);

    service
        .start_task(StartTaskParams {
            task_id: task_id.to_string(),
        })
        .await
        .unwrap()
        .task
}
