//! Shared fixtures for integration tests.

use std::sync::Arc;

use abathur::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
use abathur::domain::models::TaskSource;
use abathur::services::{
    DependencyResolver, EnqueueTask, PriorityCalculator, TaskQueueService,
};
use uuid::Uuid;

/// A queue service wired to a fresh in-memory database.
pub struct TestQueue {
    pub repo: Arc<SqliteTaskRepository>,
    pub resolver: Arc<DependencyResolver>,
    pub service: Arc<TaskQueueService>,
}

pub async fn setup_queue() -> TestQueue {
    let pool = create_migrated_test_pool()
        .await
        .expect("failed to create test database");
    let repo = Arc::new(SqliteTaskRepository::new(pool));
    let resolver = Arc::new(DependencyResolver::new(repo.clone()));
    let service = Arc::new(TaskQueueService::new(
        repo.clone(),
        resolver.clone(),
        PriorityCalculator::new(),
    ));
    TestQueue {
        repo,
        resolver,
        service,
    }
}

impl TestQueue {
    /// Enqueue a human task with default priority and the given
    /// prerequisites; returns its id.
    pub async fn enqueue(&self, prompt: &str, prerequisites: &[Uuid]) -> Uuid {
        let request = EnqueueTask::new(prompt, TaskSource::Human)
            .with_prerequisites(prerequisites.to_vec());
        self.service
            .enqueue_task(request)
            .await
            .expect("enqueue failed")
            .id
    }
}
