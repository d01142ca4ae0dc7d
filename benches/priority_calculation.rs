//! Priority scoring micro-benchmarks.

use abathur::domain::models::{Task, TaskSource};
use abathur::services::PriorityCalculator;
use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_calculate(c: &mut Criterion) {
    let calc = PriorityCalculator::new();

    let plain = Task::new("plain task");
    c.bench_function("priority_plain", |b| {
        b.iter(|| black_box(calc.calculate(black_box(&plain), black_box(3))));
    });

    let mut deadline = Task::new("deadline task").with_source(TaskSource::AgentPlanner);
    deadline.deadline = Some(Utc::now() + Duration::hours(2));
    deadline.submitted_at = Utc::now() - Duration::hours(10);
    c.bench_function("priority_with_deadline", |b| {
        b.iter(|| black_box(calc.calculate(black_box(&deadline), black_box(5))));
    });
}

criterion_group!(benches, bench_calculate);
criterion_main!(benches);
