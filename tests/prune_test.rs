//! Bulk prune: selection filters, dry-run parity, referential integrity,
//! vacuum policy, child protection, recursive mode.

mod common;

use abathur::domain::errors::DomainError;
use abathur::domain::models::{
    Agent, PruneFilters, Task, TaskSource, TaskStatus, VacuumMode,
};
use abathur::domain::ports::{TaskFilters, TaskRepository};
use abathur::services::EnqueueTask;
use chrono::{Duration, Utc};
use common::{setup_queue, TestQueue};
use uuid::Uuid;

/// Insert a terminal task whose timestamps lie `age_days` in the past.
async fn insert_aged_task(queue: &TestQueue, status: TaskStatus, age_days: i64) -> Uuid {
    let mut task = Task::new(format!("aged {status} task"));
    task.status = status;
    let stamp = Utc::now() - Duration::days(age_days);
    task.submitted_at = stamp;
    task.last_updated_at = stamp;
    if status.is_terminal() {
        task.completed_at = Some(stamp);
    }
    queue.repo.insert_task(&task, &[]).await.unwrap();
    task.id
}

#[tokio::test]
async fn test_empty_criteria_rejected() {
    let queue = setup_queue().await;
    let err = queue
        .service
        .prune_tasks(&PruneFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_non_terminal_status_filter_rejected() {
    let queue = setup_queue().await;
    let filters = PruneFilters {
        statuses: Some(vec![TaskStatus::Running]),
        ..PruneFilters::default()
    };
    let err = queue.service.prune_tasks(&filters).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_age_filter_selects_only_old_terminal_tasks() {
    let queue = setup_queue().await;

    let old_completed = insert_aged_task(&queue, TaskStatus::Completed, 40).await;
    let fresh_completed = insert_aged_task(&queue, TaskStatus::Completed, 5).await;
    let old_running = insert_aged_task(&queue, TaskStatus::Running, 40).await;

    let result = queue
        .service
        .prune_tasks(&PruneFilters::older_than(30))
        .await
        .unwrap();

    assert_eq!(result.deleted_tasks, 1);
    assert_eq!(result.breakdown_by_status[&TaskStatus::Completed], 1);
    assert!(queue.service.get_task(old_completed).await.unwrap().is_none());
    assert!(queue.service.get_task(fresh_completed).await.unwrap().is_some());
    assert!(queue.service.get_task(old_running).await.unwrap().is_some());
}

#[tokio::test]
async fn test_dry_run_parity() {
    let queue = setup_queue().await;

    for _ in 0..4 {
        insert_aged_task(&queue, TaskStatus::Completed, 45).await;
    }
    insert_aged_task(&queue, TaskStatus::Failed, 45).await;

    let preview = queue
        .service
        .prune_tasks(&PruneFilters {
            dry_run: true,
            ..PruneFilters::older_than(30)
        })
        .await
        .unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.deleted_tasks, 5);
    assert!(preview.reclaimed_bytes.is_none());

    // Dry run deleted nothing.
    let total = queue
        .repo
        .count_tasks(&TaskFilters::default())
        .await
        .unwrap();
    assert_eq!(total, 5);

    // The real run deletes exactly the previewed count.
    let real = queue
        .service
        .prune_tasks(&PruneFilters::older_than(30))
        .await
        .unwrap();
    assert_eq!(real.deleted_tasks, preview.deleted_tasks);
    assert_eq!(real.breakdown_by_status, preview.breakdown_by_status);
    assert_eq!(
        queue
            .repo
            .count_tasks(&TaskFilters::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_prune_orphans_running_child_and_keeps_integrity() {
    let queue = setup_queue().await;

    // Parent completed 40 days ago with a running child.
    let parent = insert_aged_task(&queue, TaskStatus::Completed, 40).await;
    let mut child = Task::new("running child").with_parent(parent);
    child.status = TaskStatus::Running;
    child.started_at = Some(Utc::now());
    queue.repo.insert_task(&child, &[]).await.unwrap();

    let result = queue
        .service
        .prune_tasks(&PruneFilters::older_than(30))
        .await
        .unwrap();
    assert_eq!(result.deleted_tasks, 1);

    assert!(queue.service.get_task(parent).await.unwrap().is_none());
    let surviving = queue.service.get_task(child.id).await.unwrap().unwrap();
    assert_eq!(surviving.status, TaskStatus::Running);
    assert!(surviving.parent_task_id.is_none());

    assert!(queue.repo.foreign_key_check().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prune_referential_dance() {
    let queue = setup_queue().await;

    let target = insert_aged_task(&queue, TaskStatus::Completed, 40).await;
    let survivor = insert_aged_task(&queue, TaskStatus::Completed, 1).await;

    // Hang the full set of ancillary rows off the target.
    let agent = Agent::new(target, "worker");
    queue.repo.insert_agent(&agent).await.unwrap();
    queue
        .repo
        .insert_checkpoint(target, 1, &serde_json::json!({"step": 1}))
        .await
        .unwrap();
    queue
        .repo
        .log_audit(Some(agent.id), Some(target), "execute", None)
        .await
        .unwrap();
    queue
        .repo
        .set_state(target, "phase", &serde_json::json!("done"))
        .await
        .unwrap();

    let result = queue
        .service
        .prune_tasks(&PruneFilters::older_than(30))
        .await
        .unwrap();
    assert_eq!(result.deleted_tasks, 1);

    let pool = queue.repo.pool();
    let (agents,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agents")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(agents, 0, "agents cascade with their task");

    let (checkpoints,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkpoints")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(checkpoints, 0, "checkpoints cascade with their task");

    let (state_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM state")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(state_rows, 0, "legacy state rows are deleted explicitly");

    // Audit rows survive with a nulled agent reference.
    let (audit_rows, null_agents): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), SUM(CASE WHEN agent_id IS NULL THEN 1 ELSE 0 END) FROM audit",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(audit_rows, 1);
    assert_eq!(null_agents, 1);

    assert!(queue.service.get_task(survivor).await.unwrap().is_some());
    assert!(queue.repo.foreign_key_check().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prune_deletes_dependency_edges_on_both_sides() {
    let queue = setup_queue().await;

    let a = queue.enqueue("a", &[]).await;
    let b = queue.enqueue("b", &[a]).await;
    queue.service.get_next_task().await.unwrap();
    queue.service.complete_task(a).await.unwrap();
    queue.service.get_next_task().await.unwrap();
    queue.service.complete_task(b).await.unwrap();

    let result = queue
        .service
        .prune_tasks(&PruneFilters::for_ids(vec![a, b]))
        .await
        .unwrap();
    assert_eq!(result.deleted_tasks, 2);
    assert_eq!(result.deleted_dependencies, 1);

    let (edges,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_dependencies")
        .fetch_one(queue.repo.pool())
        .await
        .unwrap();
    assert_eq!(edges, 0);
}

#[tokio::test]
async fn test_id_prune_refuses_parent_with_live_child() {
    let queue = setup_queue().await;

    let parent = insert_aged_task(&queue, TaskStatus::Completed, 10).await;
    let child = Task::new("live child").with_parent(parent);
    queue.repo.insert_task(&child, &[]).await.unwrap();

    let result = queue
        .service
        .prune_tasks(&PruneFilters::for_ids(vec![parent]))
        .await
        .unwrap();

    assert_eq!(result.deleted_tasks, 0);
    assert_eq!(result.skipped_parents, vec![parent]);
    assert!(queue.service.get_task(parent).await.unwrap().is_some());

    // Selecting parent and child together deletes both.
    let mut child_task = queue.service.get_task(child.id).await.unwrap().unwrap();
    child_task.transition_to(TaskStatus::Cancelled).unwrap();
    queue.repo.update_task(&child_task).await.unwrap();

    let result = queue
        .service
        .prune_tasks(&PruneFilters::for_ids(vec![parent, child.id]))
        .await
        .unwrap();
    assert_eq!(result.deleted_tasks, 2);
    assert!(result.skipped_parents.is_empty());
}

#[tokio::test]
async fn test_recursive_prune_deletes_whole_tree() {
    let queue = setup_queue().await;

    let root = insert_aged_task(&queue, TaskStatus::Completed, 10).await;
    let mut child = Task::new("child").with_parent(root);
    child.status = TaskStatus::Completed;
    child.completed_at = Some(Utc::now());
    queue.repo.insert_task(&child, &[]).await.unwrap();
    let mut grandchild = Task::new("grandchild").with_parent(child.id);
    grandchild.status = TaskStatus::Failed;
    grandchild.completed_at = Some(Utc::now());
    queue.repo.insert_task(&grandchild, &[]).await.unwrap();

    let filters = PruneFilters {
        recursive: true,
        ..PruneFilters::for_ids(vec![root])
    };
    let result = queue.service.prune_tasks(&filters).await.unwrap();

    assert_eq!(result.deleted_tasks, 3);
    for id in [root, child.id, grandchild.id] {
        assert!(queue.service.get_task(id).await.unwrap().is_none());
    }
    assert!(queue.repo.foreign_key_check().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recursive_prune_refuses_active_descendant() {
    let queue = setup_queue().await;

    let root = insert_aged_task(&queue, TaskStatus::Completed, 10).await;
    let mut child = Task::new("still running").with_parent(root);
    child.status = TaskStatus::Running;
    queue.repo.insert_task(&child, &[]).await.unwrap();

    let filters = PruneFilters {
        recursive: true,
        ..PruneFilters::for_ids(vec![root])
    };
    let err = queue.service.prune_tasks(&filters).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
    assert!(queue.service.get_task(root).await.unwrap().is_some());
}

#[tokio::test]
async fn test_limit_prunes_oldest_first() {
    let queue = setup_queue().await;

    let oldest = insert_aged_task(&queue, TaskStatus::Completed, 60).await;
    let middle = insert_aged_task(&queue, TaskStatus::Completed, 50).await;
    let newest = insert_aged_task(&queue, TaskStatus::Completed, 40).await;

    let filters = PruneFilters {
        limit: Some(2),
        ..PruneFilters::older_than(30)
    };
    let result = queue.service.prune_tasks(&filters).await.unwrap();
    assert_eq!(result.deleted_tasks, 2);

    assert!(queue.service.get_task(oldest).await.unwrap().is_none());
    assert!(queue.service.get_task(middle).await.unwrap().is_none());
    assert!(queue.service.get_task(newest).await.unwrap().is_some());
}

#[tokio::test]
async fn test_vacuum_never_reports_no_reclaim() {
    let queue = setup_queue().await;
    insert_aged_task(&queue, TaskStatus::Completed, 40).await;

    let filters = PruneFilters {
        vacuum_mode: VacuumMode::Never,
        ..PruneFilters::older_than(30)
    };
    let result = queue.service.prune_tasks(&filters).await.unwrap();
    assert_eq!(result.deleted_tasks, 1);
    assert!(result.reclaimed_bytes.is_none());
    assert!(!result.vacuum_auto_skipped);
}

#[tokio::test]
async fn test_vacuum_conditional_below_threshold_skips() {
    let queue = setup_queue().await;
    insert_aged_task(&queue, TaskStatus::Completed, 40).await;

    let result = queue
        .service
        .prune_tasks(&PruneFilters::older_than(30))
        .await
        .unwrap();
    // One deleted task is below the conditional threshold of 100.
    assert!(result.reclaimed_bytes.is_none());
    assert!(!result.vacuum_auto_skipped);
}

#[tokio::test]
async fn test_vacuum_always_measures_reclaim() {
    let queue = setup_queue().await;
    insert_aged_task(&queue, TaskStatus::Completed, 40).await;

    let filters = PruneFilters {
        vacuum_mode: VacuumMode::Always,
        ..PruneFilters::older_than(30)
    };
    let result = queue.service.prune_tasks(&filters).await.unwrap();
    assert_eq!(result.deleted_tasks, 1);
    assert!(result.reclaimed_bytes.is_some());
}

#[tokio::test]
async fn test_large_prune_auto_skips_conditional_vacuum() {
    let queue = setup_queue().await;

    // Seed 10,000 aged completed rows in one statement; per-row inserts
    // would dominate the test's runtime.
    let stamp = (Utc::now() - Duration::days(60)).to_rfc3339();
    let seed = format!(
        "WITH RECURSIVE seq(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM seq WHERE i < 10000)
         INSERT INTO tasks (id, prompt, summary, status, input_data,
                            submitted_at, completed_at, last_updated_at)
         SELECT lower(hex(randomblob(4))) || '-' || lower(hex(randomblob(2))) || '-' ||
                lower(hex(randomblob(2))) || '-' || lower(hex(randomblob(2))) || '-' ||
                lower(hex(randomblob(6))),
                'bulk task ' || i, 'bulk', 'completed', '{{}}',
                '{stamp}', '{stamp}', '{stamp}'
         FROM seq"
    );
    sqlx::raw_sql(&seed)
        .execute(queue.repo.pool())
        .await
        .unwrap();

    let result = queue
        .service
        .prune_tasks(&PruneFilters::older_than(30))
        .await
        .unwrap();

    assert_eq!(result.deleted_tasks, 10_000);
    assert!(result.vacuum_auto_skipped);
    assert!(result.reclaimed_bytes.is_none());
    assert_eq!(
        queue
            .repo
            .count_tasks(&TaskFilters::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_cancelled_status_prune_with_breakdown() {
    let queue = setup_queue().await;

    insert_aged_task(&queue, TaskStatus::Cancelled, 1).await;
    insert_aged_task(&queue, TaskStatus::Cancelled, 2).await;
    insert_aged_task(&queue, TaskStatus::Completed, 1).await;

    let filters = PruneFilters {
        statuses: Some(vec![TaskStatus::Cancelled]),
        ..PruneFilters::default()
    };
    let result = queue.service.prune_tasks(&filters).await.unwrap();

    assert_eq!(result.deleted_tasks, 2);
    assert_eq!(result.breakdown_by_status.len(), 1);
    assert_eq!(result.breakdown_by_status[&TaskStatus::Cancelled], 2);
}

#[tokio::test]
async fn test_before_date_filter() {
    let queue = setup_queue().await;

    let old = insert_aged_task(&queue, TaskStatus::Completed, 20).await;
    let recent = insert_aged_task(&queue, TaskStatus::Completed, 2).await;

    let filters = PruneFilters {
        before_date: Some(Utc::now() - Duration::days(10)),
        ..PruneFilters::default()
    };
    let result = queue.service.prune_tasks(&filters).await.unwrap();

    assert_eq!(result.deleted_tasks, 1);
    assert!(queue.service.get_task(old).await.unwrap().is_none());
    assert!(queue.service.get_task(recent).await.unwrap().is_some());
}

#[tokio::test]
async fn test_enqueue_after_prune_reuses_nothing() {
    let queue = setup_queue().await;

    let a = insert_aged_task(&queue, TaskStatus::Completed, 40).await;
    queue
        .service
        .prune_tasks(&PruneFilters::older_than(30))
        .await
        .unwrap();

    // The store stays fully usable after a prune.
    let fresh = queue
        .service
        .enqueue_task(EnqueueTask::new("post-prune", TaskSource::Human))
        .await
        .unwrap();
    assert_ne!(fresh.id, a);
    assert_eq!(fresh.status, TaskStatus::Ready);
}
