//! Bounded-concurrency worker pool over the task queue.
//!
//! The orchestrator drives one poll loop: spawn executions while below the
//! concurrency cap, sleep when the queue is empty, convert executor outcomes
//! into queue transitions as they land. `task_limit` gates spawning; already
//! in-flight executions always run to completion and are reported.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{ExecutionResult, TaskExecutor};
use crate::services::TaskQueueService;

/// Configuration for the swarm orchestrator.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Maximum concurrent executions.
    pub max_concurrent_agents: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Stop spawning after this many tasks have been spawned. `Some(0)`
    /// halts before the first spawn.
    pub task_limit: Option<usize>,
    /// How long shutdown waits for in-flight executions before cancelling.
    pub shutdown_timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 3,
            poll_interval: Duration::from_secs(2),
            task_limit: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome counters for one orchestrator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmRunReport {
    pub tasks_spawned: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    /// Executions still in flight when the shutdown timeout expired.
    pub tasks_cancelled_inflight: usize,
}

impl SwarmRunReport {
    /// Completions that passed through the orchestrator.
    pub fn tasks_completed(&self) -> usize {
        self.tasks_succeeded + self.tasks_failed
    }
}

pub struct SwarmOrchestrator {
    queue: Arc<TaskQueueService>,
    executor: Arc<dyn TaskExecutor>,
    config: SwarmConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl SwarmOrchestrator {
    pub fn new(
        queue: Arc<TaskQueueService>,
        executor: Arc<dyn TaskExecutor>,
        config: SwarmConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            executor,
            config,
            shutdown_tx,
        }
    }

    /// Request a graceful stop: spawning halts, in-flight executions drain.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Drive the poll loop until shutdown or task-limit exhaustion, then
    /// drain in-flight executions bounded by the shutdown timeout.
    #[instrument(skip(self), err)]
    pub async fn run(&self) -> DomainResult<SwarmRunReport> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut active: JoinSet<(Uuid, DomainResult<ExecutionResult>)> = JoinSet::new();
        let mut report = SwarmRunReport::default();

        info!(
            max_agents = self.config.max_concurrent_agents,
            task_limit = ?self.config.task_limit,
            "swarm orchestrator started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            if self.limit_reached(report.tasks_spawned) {
                info!(spawned = report.tasks_spawned, "task limit reached, draining");
                break;
            }

            // Fill capacity from the queue.
            let mut queue_empty = false;
            while active.len() < self.config.max_concurrent_agents
                && !self.limit_reached(report.tasks_spawned)
            {
                match self.queue.get_next_task().await? {
                    Some(task) => {
                        report.tasks_spawned += 1;
                        let executor = Arc::clone(&self.executor);
                        active.spawn(async move {
                            let result = executor.execute_task(&task).await;
                            (task.id, result)
                        });
                    }
                    None => {
                        queue_empty = true;
                        break;
                    }
                }
            }

            if active.is_empty() {
                if queue_empty {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                continue;
            }

            tokio::select! {
                joined = active.join_next() => {
                    if let Some(joined) = joined {
                        self.handle_completion(joined, &mut report).await;
                    }
                }
                _ = shutdown_rx.changed() => {}
            }
        }

        self.drain(active, &mut report).await;

        info!(
            spawned = report.tasks_spawned,
            succeeded = report.tasks_succeeded,
            failed = report.tasks_failed,
            cancelled_inflight = report.tasks_cancelled_inflight,
            "swarm orchestrator stopped"
        );
        Ok(report)
    }

    fn limit_reached(&self, spawned: usize) -> bool {
        self.config.task_limit.is_some_and(|limit| spawned >= limit)
    }

    async fn drain(
        &self,
        mut active: JoinSet<(Uuid, DomainResult<ExecutionResult>)>,
        report: &mut SwarmRunReport,
    ) {
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        while !active.is_empty() {
            match tokio::time::timeout_at(deadline, active.join_next()).await {
                Ok(Some(joined)) => self.handle_completion(joined, report).await,
                Ok(None) => break,
                Err(_) => {
                    report.tasks_cancelled_inflight = active.len();
                    warn!(
                        remaining = active.len(),
                        "shutdown timeout expired, aborting in-flight executions"
                    );
                    active.abort_all();
                    while active.join_next().await.is_some() {}
                    break;
                }
            }
        }
    }

    async fn handle_completion(
        &self,
        joined: Result<(Uuid, DomainResult<ExecutionResult>), tokio::task::JoinError>,
        report: &mut SwarmRunReport,
    ) {
        let (task_id, outcome) = match joined {
            Ok(pair) => pair,
            Err(join_error) => {
                // The execution future itself died; the task row stays
                // RUNNING and stale detection will reap it.
                warn!(error = %join_error, "execution task panicked or was aborted");
                report.tasks_failed += 1;
                return;
            }
        };

        match outcome {
            Ok(result) if result.success => match self.queue.complete_task(task_id).await {
                Ok(unblocked) => {
                    report.tasks_succeeded += 1;
                    if !unblocked.is_empty() {
                        info!(
                            task_id = %task_id,
                            unblocked = unblocked.len(),
                            "completion unblocked tasks"
                        );
                    }
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "failed to record completion");
                    report.tasks_failed += 1;
                }
            },
            Ok(result) => {
                let message = result
                    .error
                    .unwrap_or_else(|| "execution reported failure".to_string());
                self.record_failure(task_id, &message, report).await;
            }
            Err(e) => {
                // Infrastructure error from the executor port.
                self.record_failure(task_id, &e.to_string(), report).await;
            }
        }
    }

    async fn record_failure(&self, task_id: Uuid, message: &str, report: &mut SwarmRunReport) {
        report.tasks_failed += 1;
        if let Err(e) = self.queue.fail_task(task_id, message).await {
            warn!(task_id = %task_id, error = %e, "failed to record task failure");
        }
    }
}
