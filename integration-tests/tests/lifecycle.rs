//! Full-lifecycle scenarios: a linear chain claimed, started, completed,
//! and merged task by task, plus merge cleanup and task abandonment.

use weft_core::{
    protocol::{
        CleanupTaskParams, CompleteTaskParams, CreateTasksParams, FilePatternSpec, GetTaskParams,
        ListTasksParams, MergeResultKind, MergeTaskParams, TaskSpec, UpdateProgressParams,
    },
    ProgressEvent, TaskStatus, TaskStore,
};
use weft_integration_tests::{drive_to_in_progress, service_in_memory};

fn spec(title: &str, depends_on: &[i64]) -> TaskSpec {
    TaskSpec {
        title: title.to_string(),
        description: format!("{title} work"),
        priority: Default::default(),
        depends_on: depends_on.to_vec(),
        file_patterns: Vec::new(),
    }
}

fn blog_params() -> CreateTasksParams {
    CreateTasksParams {
        title: "Blog".to_string(),
        description: "Build the blog backend".to_string(),
        tasks: vec![
            spec("DB Schema", &[]),
            spec("Auth", &[]),
            spec("CRUD API", &[1, 2]),
        ],
    }
}

#[tokio::test]
async fn test_linear_chain_full_lifecycle() {
    let (service, _store, git) = service_in_memory().await;

    // Create: independent tasks start pending, the dependent one blocked.
    let created = service.create_tasks(blog_params()).await.unwrap();
    assert!(created.warnings.is_empty());
    assert_eq!(created.tasks.len(), 3);
    assert_eq!(created.tasks[0].status, TaskStatus::Pending);
    assert_eq!(created.tasks[0].can_start, Some(true));
    assert_eq!(created.tasks[1].can_start, Some(true));
    assert_eq!(created.tasks[2].status, TaskStatus::Blocked);
    assert_eq!(created.tasks[2].can_start, Some(false));

    let ids: Vec<String> = created.tasks.iter().map(|t| t.id.clone()).collect();

    // Task 1 all the way to trunk.
    let task1 = drive_to_in_progress(&service, &ids[0]).await;
    assert_eq!(task1.status, TaskStatus::InProgress);
    assert_eq!(task1.branch_name.as_deref(), Some("task/task-1-db-schema"));
    assert_eq!(
        task1.worktree_path.as_deref(),
        Some("/repo/.worktrees/task-1-db-schema")
    );
    assert!(task1.started_at.is_some());
    assert!(task1.assigned_to.is_some());

    let completed = service
        .complete_task(CompleteTaskParams {
            task_id: ids[0].clone(),
            summary: "schema in place".to_string(),
            files_changed: vec!["src/db/schema.sql".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(completed.task.status, TaskStatus::InReview);
    assert_eq!(completed.task.progress, 100);
    assert!(completed.task.completed_at.is_some());
    // CRUD API still waits on Auth.
    assert!(completed.unlocked.is_empty());

    let merged = service
        .merge_task(MergeTaskParams {
            task_id: ids[0].clone(),
            strategy: Default::default(),
        })
        .await
        .unwrap();
    assert_eq!(merged.merge_result, MergeResultKind::Clean);
    let task1 = merged.task.unwrap();
    assert_eq!(task1.status, TaskStatus::Completed);
    assert!(task1.merged_at.is_some());

    // Task 2: completing it (with task 1 already merged) unblocks task 3.
    drive_to_in_progress(&service, &ids[1]).await;
    let completed = service
        .complete_task(CompleteTaskParams {
            task_id: ids[1].clone(),
            summary: "auth done".to_string(),
            files_changed: vec![],
        })
        .await
        .unwrap();
    assert_eq!(completed.unlocked.len(), 1);
    assert_eq!(completed.unlocked[0].sequence, 3);
    assert_eq!(completed.unlocked[0].status, TaskStatus::Pending);
    assert_eq!(completed.unlocked[0].can_start, Some(true));

    service
        .merge_task(MergeTaskParams {
            task_id: ids[1].clone(),
            strategy: Default::default(),
        })
        .await
        .unwrap();

    // Task 3 is now claimable; run it to the end.
    drive_to_in_progress(&service, &ids[2]).await;
    service
        .complete_task(CompleteTaskParams {
            task_id: ids[2].clone(),
            summary: "api wired".to_string(),
            files_changed: vec![],
        })
        .await
        .unwrap();
    let merged = service
        .merge_task(MergeTaskParams {
            task_id: ids[2].clone(),
            strategy: Default::default(),
        })
        .await
        .unwrap();
    assert_eq!(merged.merge_result, MergeResultKind::Clean);

    let listing = service
        .list_tasks(ListTasksParams {
            group_id: Some(created.group_id.clone()),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(listing.summary.total, 3);
    assert_eq!(listing.summary.completed, 3);
    assert_eq!(listing.summary.pending, 0);
    assert_eq!(listing.summary.blocked, 0);

    // Every branch and worktree was cleaned up along the way.
    assert!(git.branches().is_empty());
    assert!(git.worktrees().is_empty());
}

#[tokio::test]
async fn test_merge_clean_cleans_up_and_logs() {
    let (service, _store, git) = service_in_memory().await;
    let created = service
        .create_tasks(CreateTasksParams {
            title: "One".to_string(),
            description: String::new(),
            tasks: vec![spec("Solo", &[])],
        })
        .await
        .unwrap();
    let task_id = created.tasks[0].id.clone();

    drive_to_in_progress(&service, &task_id).await;
    service
        .complete_task(CompleteTaskParams {
            task_id: task_id.clone(),
            summary: "done".to_string(),
            files_changed: vec![],
        })
        .await
        .unwrap();

    let merged = service
        .merge_task(MergeTaskParams {
            task_id: task_id.clone(),
            strategy: Default::default(),
        })
        .await
        .unwrap();
    assert_eq!(merged.merge_result, MergeResultKind::Clean);
    assert!(merged.task.unwrap().merged_at.is_some());

    git.assert_called("merge task/task-1-solo (squash)");
    git.assert_called("remove_worktree /repo/.worktrees/task-1-solo");
    git.assert_called("delete_branch task/task-1-solo");

    let detail = service
        .get_task(GetTaskParams {
            task_id: task_id.clone(),
        })
        .await
        .unwrap();
    let events: Vec<ProgressEvent> = detail.progress_log.iter().map(|l| l.event).collect();
    assert_eq!(
        events,
        vec![
            ProgressEvent::Claimed,
            ProgressEvent::Started,
            ProgressEvent::Completed,
            ProgressEvent::Merged,
        ]
    );
}

#[tokio::test]
async fn test_merge_requires_trunk() {
    let (service, _store, git) = service_in_memory().await;
    let created = service
        .create_tasks(CreateTasksParams {
            title: "One".to_string(),
            description: String::new(),
            tasks: vec![spec("Solo", &[])],
        })
        .await
        .unwrap();
    let task_id = created.tasks[0].id.clone();

    drive_to_in_progress(&service, &task_id).await;
    service
        .complete_task(CompleteTaskParams {
            task_id: task_id.clone(),
            summary: "done".to_string(),
            files_changed: vec![],
        })
        .await
        .unwrap();

    git.set_current_branch(Some("task/task-1-solo"));
    let err = service
        .merge_task(MergeTaskParams {
            task_id: task_id.clone(),
            strategy: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("trunk"));
}

#[tokio::test]
async fn test_cleanup_of_started_task() {
    let (service, _store, git) = service_in_memory().await;
    let created = service
        .create_tasks(CreateTasksParams {
            title: "One".to_string(),
            description: String::new(),
            tasks: vec![spec("Doomed", &[])],
        })
        .await
        .unwrap();
    let task_id = created.tasks[0].id.clone();

    let started = drive_to_in_progress(&service, &task_id).await;
    let agent = started.assigned_to.clone();

    let cleaned = service
        .cleanup_task(CleanupTaskParams {
            task_id: task_id.clone(),
            reason: Some("abandoned".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(cleaned.task.status, TaskStatus::Failed);
    assert!(cleaned.cleaned.worktree_removed);
    assert!(cleaned.cleaned.branch_deleted);
    // Worker identity is retained for audit.
    assert_eq!(cleaned.task.assigned_to, agent);
    assert!(git.worktrees().is_empty());
    assert!(git.branches().is_empty());

    let detail = service
        .get_task(GetTaskParams {
            task_id: task_id.clone(),
        })
        .await
        .unwrap();
    let failed = detail
        .progress_log
        .iter()
        .find(|l| l.event == ProgressEvent::Failed)
        .expect("failed entry present");
    assert!(failed.message.contains("abandoned"));
    let metadata = failed.metadata.as_ref().unwrap();
    assert_eq!(metadata["worktree_removed"], true);
    assert_eq!(metadata["branch_deleted"], true);

    // Terminal tasks cannot be cleaned again.
    assert!(service
        .cleanup_task(CleanupTaskParams {
            task_id,
            reason: None,
        })
        .await
        .is_err());
}

#[tokio::test]
async fn test_start_failure_keeps_task_assigned() {
    let (service, _store, git) = service_in_memory().await;
    let created = service
        .create_tasks(CreateTasksParams {
            title: "One".to_string(),
            description: String::new(),
            tasks: vec![spec("Fragile", &[])],
        })
        .await
        .unwrap();
    let task_id = created.tasks[0].id.clone();

    let claim = service
        .claim_task(weft_core::protocol::ClaimTaskParams {
            task_id: task_id.clone(),
            agent_id: Some("agent-x".to_string()),
        })
        .await
        .unwrap();
    assert!(claim.success);

    git.inject_error(weft_core::CoordError::Git(
        "fatal: could not create work tree".to_string(),
    ));
    let err = service
        .start_task(weft_core::protocol::StartTaskParams {
            task_id: task_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(err.is_git());

    // The transition was aborted: still assigned, no branch recorded.
    let detail = service
        .get_task(GetTaskParams {
            task_id: task_id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(detail.task.status, TaskStatus::Assigned);
    assert!(detail.task.branch_name.is_none());
    assert!(detail.task.worktree_path.is_none());

    // Retry succeeds once git cooperates.
    let started = service
        .start_task(weft_core::protocol::StartTaskParams { task_id })
        .await
        .unwrap();
    assert_eq!(started.task.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_start_briefing_lists_completed_prerequisites() {
    let (service, store, _git) = service_in_memory().await;
    let created = service
        .create_tasks(CreateTasksParams {
            title: "Chain".to_string(),
            description: String::new(),
            tasks: vec![
                TaskSpec {
                    title: "DB Schema".to_string(),
                    description: String::new(),
                    priority: Default::default(),
                    depends_on: vec![],
                    file_patterns: vec![FilePatternSpec {
                        pattern: "src/db/**".to_string(),
                        ownership_type: Default::default(),
                    }],
                },
                spec("API", &[1]),
            ],
        })
        .await
        .unwrap();
    let ids: Vec<String> = created.tasks.iter().map(|t| t.id.clone()).collect();

    drive_to_in_progress(&service, &ids[0]).await;
    service
        .complete_task(CompleteTaskParams {
            task_id: ids[0].clone(),
            summary: "done".to_string(),
            files_changed: vec![],
        })
        .await
        .unwrap();
    service
        .merge_task(MergeTaskParams {
            task_id: ids[0].clone(),
            strategy: Default::default(),
        })
        .await
        .unwrap();

    // progress=100 invariant held through review and completion.
    let detail = service
        .get_task(GetTaskParams {
            task_id: ids[0].clone(),
        })
        .await
        .unwrap();
    assert_eq!(detail.task.progress, 100);

    let claim = service
        .claim_task(weft_core::protocol::ClaimTaskParams {
            task_id: ids[1].clone(),
            agent_id: None,
        })
        .await
        .unwrap();
    assert!(claim.success);

    let briefing = service
        .start_task(weft_core::protocol::StartTaskParams {
            task_id: ids[1].clone(),
        })
        .await
        .unwrap();
    assert_eq!(briefing.description, "API work");
    assert_eq!(briefing.completed_dependencies.len(), 1);
    assert_eq!(briefing.completed_dependencies[0].title, "DB Schema");
    assert_eq!(
        briefing.completed_dependencies[0].branch_name.as_deref(),
        Some("task/task-1-db-schema")
    );

    // The second task is confirmed in progress in the store as well.
    let stored = store.get_task(&ids[1]).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::InProgress);

    let update = service
        .update_progress(UpdateProgressParams {
            task_id: ids[1].clone(),
            progress: 10,
            note: None,
            files_changed: None,
        })
        .await
        .unwrap();
    assert!(!update.rebase_recommended);
}
