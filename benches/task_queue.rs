//! Enqueue/dequeue throughput against an in-memory store.

use std::sync::Arc;

use abathur::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
use abathur::domain::models::TaskSource;
use abathur::services::{
    DependencyResolver, EnqueueTask, PriorityCalculator, TaskQueueService,
};
use criterion::{criterion_group, criterion_main, Criterion};

async fn build_service() -> Arc<TaskQueueService> {
    let pool = create_migrated_test_pool().await.expect("test pool");
    let repo = Arc::new(SqliteTaskRepository::new(pool));
    let resolver = Arc::new(DependencyResolver::new(repo.clone()));
    Arc::new(TaskQueueService::new(
        repo,
        resolver,
        PriorityCalculator::new(),
    ))
}

fn bench_enqueue(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let service = runtime.block_on(build_service());

    c.bench_function("enqueue_task", |b| {
        b.to_async(&runtime).iter(|| {
            let service = Arc::clone(&service);
            async move {
                service
                    .enqueue_task(EnqueueTask::new("bench task", TaskSource::Human))
                    .await
                    .unwrap()
            }
        });
    });
}

fn bench_enqueue_dequeue_cycle(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let service = runtime.block_on(build_service());

    c.bench_function("enqueue_dequeue_complete", |b| {
        b.to_async(&runtime).iter(|| {
            let service = Arc::clone(&service);
            async move {
                let task = service
                    .enqueue_task(EnqueueTask::new("cycle task", TaskSource::Human))
                    .await
                    .unwrap();
                let claimed = service.get_next_task().await.unwrap().unwrap();
                service.complete_task(claimed.id).await.unwrap();
                task.id
            }
        });
    });
}

criterion_group!(benches, bench_enqueue, bench_enqueue_dequeue_cycle);
criterion_main!(benches);
