//! Task queue lifecycle operations.
//!
//! The only writer of task lifecycle state above the store. Every operation
//! runs as an atomic store transition and invalidates the resolver cache
//! before returning, including on error paths.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    derive_summary, PruneFilters, PruneResult, QueueStats, Task, TaskSource, TaskStatus,
    MAX_SUMMARY_LEN,
};
use crate::domain::ports::{TaskFilters, TaskRepository};
use crate::services::{DependencyResolver, PriorityCalculator};

/// Parameters for enqueueing a task.
#[derive(Debug, Clone)]
pub struct EnqueueTask {
    pub description: String,
    pub source: TaskSource,
    pub summary: Option<String>,
    pub parent_task_id: Option<Uuid>,
    pub prerequisites: Vec<Uuid>,
    pub base_priority: u8,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_seconds: Option<u64>,
    pub agent_type: String,
    pub session_id: Option<String>,
    pub input_data: Option<serde_json::Value>,
    pub feature_branch: Option<String>,
    pub task_branch: Option<String>,
}

impl EnqueueTask {
    pub fn new(description: impl Into<String>, source: TaskSource) -> Self {
        Self {
            description: description.into(),
            source,
            summary: None,
            parent_task_id: None,
            prerequisites: Vec::new(),
            base_priority: 5,
            deadline: None,
            estimated_duration_seconds: None,
            agent_type: "requirements-gatherer".to_string(),
            session_id: None,
            input_data: None,
            feature_branch: None,
            task_branch: None,
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<Uuid>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn with_priority(mut self, base_priority: u8) -> Self {
        self.base_priority = base_priority;
        self
    }

    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }
}

/// Field changes for `update_task`.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub base_priority: Option<u8>,
    pub agent_type: Option<String>,
}

pub struct TaskQueueService {
    repo: Arc<dyn TaskRepository>,
    resolver: Arc<DependencyResolver>,
    calculator: PriorityCalculator,
}

impl TaskQueueService {
    pub fn new(
        repo: Arc<dyn TaskRepository>,
        resolver: Arc<DependencyResolver>,
        calculator: PriorityCalculator,
    ) -> Self {
        Self {
            repo,
            resolver,
            calculator,
        }
    }

    /// Enqueue a new task with dependency validation and priority
    /// calculation.
    ///
    /// The task row and its edges are inserted in one transaction; depth and
    /// priority are persisted by an idempotent follow-up update once the
    /// edges are visible to the resolver.
    #[instrument(skip(self, request), err)]
    pub async fn enqueue_task(&self, request: EnqueueTask) -> DomainResult<Task> {
        if request.base_priority > 10 {
            return Err(DomainError::Validation(format!(
                "base_priority must be in range [0, 10], got {}",
                request.base_priority
            )));
        }
        if request.description.trim().is_empty() {
            return Err(DomainError::Validation(
                "Task description cannot be empty".to_string(),
            ));
        }

        if !request.prerequisites.is_empty() {
            let found = self.repo.get_tasks(&request.prerequisites).await?;
            if found.len() != request.prerequisites.len() {
                let found_ids: Vec<Uuid> = found.iter().map(|t| t.id).collect();
                let missing: Vec<String> = request
                    .prerequisites
                    .iter()
                    .filter(|id| !found_ids.contains(id))
                    .map(Uuid::to_string)
                    .collect();
                return Err(DomainError::Validation(format!(
                    "Prerequisites not found: {}",
                    missing.join(", ")
                )));
            }
        }

        let mut task = Task::new(request.description);
        task.source = request.source;
        task.summary = match request.summary {
            Some(summary) => summary.trim().chars().take(MAX_SUMMARY_LEN).collect(),
            None => derive_summary(&task.prompt, request.source),
        };
        task.agent_type = request.agent_type;
        task.base_priority = request.base_priority;
        task.parent_task_id = request.parent_task_id;
        task.deadline = request.deadline;
        task.estimated_duration_seconds = request.estimated_duration_seconds;
        task.session_id = request.session_id;
        task.input_data = request.input_data;
        task.feature_branch = request.feature_branch;
        task.task_branch = request.task_branch;

        if !request.prerequisites.is_empty() {
            self.resolver
                .detect_circular_dependencies(&request.prerequisites, task.id)
                .await?;

            let unmet = self
                .resolver
                .get_unmet_dependencies(&request.prerequisites)
                .await?;
            task.status = if unmet.is_empty() {
                TaskStatus::Ready
            } else {
                TaskStatus::Blocked
            };
        } else {
            task.status = TaskStatus::Ready;
        }

        self.repo.insert_task(&task, &request.prerequisites).await?;
        self.resolver.invalidate().await;

        let depth = self.resolver.calculate_dependency_depth(task.id).await?;
        self.calculator.update_task_priority(&mut task, depth);
        self.repo
            .update_priority_and_depth(task.id, task.calculated_priority, depth)
            .await?;

        info!(
            task_id = %task.id,
            status = %task.status,
            priority = task.calculated_priority,
            depth,
            prerequisites = request.prerequisites.len(),
            "task enqueued"
        );

        Ok(task)
    }

    /// Atomically dequeue the highest-priority READY task, transitioning it
    /// to RUNNING.
    #[instrument(skip(self), err)]
    pub async fn get_next_task(&self) -> DomainResult<Option<Task>> {
        let task = self.repo.dequeue_next_task().await?;
        if let Some(task) = &task {
            info!(
                task_id = %task.id,
                priority = task.calculated_priority,
                source = %task.source,
                "task dequeued"
            );
        }
        Ok(task)
    }

    /// Mark a task COMPLETED and unblock dependents whose prerequisites are
    /// now all resolved. Returns the newly-READY task ids.
    #[instrument(skip(self), err)]
    pub async fn complete_task(&self, task_id: Uuid) -> DomainResult<Vec<Uuid>> {
        let result = self.repo.complete_task_transition(task_id).await;
        self.resolver.invalidate().await;
        let unblocked = result?;

        for id in &unblocked {
            self.refresh_priority(*id).await?;
        }

        info!(
            task_id = %task_id,
            unblocked = unblocked.len(),
            "task completed"
        );
        Ok(unblocked)
    }

    /// Mark a task FAILED and cancel its transitive unresolved-edge
    /// descendants. Returns the cancelled ids.
    #[instrument(skip(self), err)]
    pub async fn fail_task(&self, task_id: Uuid, error_message: &str) -> DomainResult<Vec<Uuid>> {
        let result = self
            .repo
            .terminate_with_cascade(task_id, TaskStatus::Failed, Some(error_message.to_string()))
            .await;
        self.resolver.invalidate().await;
        let cancelled = result?;

        warn!(
            task_id = %task_id,
            cancelled = cancelled.len(),
            error = error_message,
            "task failed"
        );
        Ok(cancelled)
    }

    /// Cancel a task and its transitive descendants. Returns the cancelled
    /// ids, the task itself first.
    #[instrument(skip(self), err)]
    pub async fn cancel_task(&self, task_id: Uuid) -> DomainResult<Vec<Uuid>> {
        let result = self
            .repo
            .terminate_with_cascade(task_id, TaskStatus::Cancelled, None)
            .await;
        self.resolver.invalidate().await;
        let descendants = result?;

        info!(
            task_id = %task_id,
            cancelled = descendants.len() + 1,
            "task cancelled"
        );

        let mut all = Vec::with_capacity(descendants.len() + 1);
        all.push(task_id);
        all.extend(descendants);
        Ok(all)
    }

    /// Begin a fresh execution epoch for a failed or cancelled task.
    #[instrument(skip(self), err)]
    pub async fn retry_task(&self, task_id: Uuid) -> DomainResult<Task> {
        let mut task = self
            .repo
            .get_task(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))?;

        if !task.can_retry() {
            return Err(DomainError::Conflict(format!(
                "Task {task_id} cannot be retried (status {}, retries {}/{})",
                task.status, task.retry_count, task.max_retries
            )));
        }

        let all_met = self.resolver.are_all_dependencies_met(task_id).await?;
        let target = if all_met {
            TaskStatus::Ready
        } else {
            TaskStatus::Pending
        };
        task.retry(target)
            .map_err(DomainError::Conflict)?;
        if !all_met {
            // The new epoch still waits on unresolved prerequisites.
            task.transition_to(TaskStatus::Blocked)
                .map_err(DomainError::Conflict)?;
        }

        let depth = self.resolver.calculate_dependency_depth(task_id).await?;
        self.calculator.update_task_priority(&mut task, depth);
        self.repo.update_task(&task).await?;
        self.resolver.invalidate().await;

        info!(task_id = %task_id, retry = task.retry_count, status = %task.status, "task retried");
        Ok(task)
    }

    /// Apply a field update with the transition rules: priority and
    /// agent-type changes are allowed only while the task sits (or lands, if
    /// the same call changes status) in PENDING or READY.
    #[instrument(skip(self, update), err)]
    pub async fn update_task(&self, task_id: Uuid, update: TaskUpdate) -> DomainResult<Task> {
        let mut task = self
            .repo
            .get_task(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))?;

        if let Some(priority) = update.base_priority {
            if priority > 10 {
                return Err(DomainError::Validation(format!(
                    "base_priority must be in range [0, 10], got {priority}"
                )));
            }
        }

        let effective_status = update.status.unwrap_or(task.status);
        let mutating_fields = update.base_priority.is_some() || update.agent_type.is_some();
        let editable = matches!(task.status, TaskStatus::Pending | TaskStatus::Ready)
            || matches!(effective_status, TaskStatus::Pending | TaskStatus::Ready);
        if mutating_fields && !editable {
            return Err(DomainError::Conflict(format!(
                "Priority/agent-type changes require a pending or ready task; \
                 task {task_id} is {}",
                task.status
            )));
        }

        if let Some(status) = update.status {
            if status != task.status {
                task.transition_to(status).map_err(|_| {
                    DomainError::InvalidStateTransition {
                        from: task.status.as_str().to_string(),
                        to: status.as_str().to_string(),
                    }
                })?;
            }
        }
        if let Some(priority) = update.base_priority {
            task.base_priority = priority;
        }
        if let Some(agent_type) = update.agent_type {
            task.agent_type = agent_type;
        }

        let depth = self.resolver.calculate_dependency_depth(task_id).await?;
        self.calculator.update_task_priority(&mut task, depth);
        task.last_updated_at = Utc::now();

        self.repo.update_task(&task).await?;
        self.resolver.invalidate().await;
        Ok(task)
    }

    /// Queue statistics for monitoring.
    pub async fn get_queue_status(&self) -> DomainResult<QueueStats> {
        self.repo.queue_stats().await
    }

    /// Execution batches: batch `i` holds the tasks of dependency depth `i`
    /// in the induced subgraph; tasks within one batch can run in parallel.
    #[instrument(skip(self), err)]
    pub async fn get_task_execution_plan(
        &self,
        task_ids: &[Uuid],
    ) -> DomainResult<Vec<Vec<Uuid>>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ordered = self.resolver.get_execution_order(task_ids).await?;

        let mut by_depth: HashMap<u32, Vec<Uuid>> = HashMap::new();
        let mut max_depth = 0;
        for id in ordered {
            let depth = self.resolver.calculate_dependency_depth(id).await?;
            max_depth = max_depth.max(depth);
            by_depth.entry(depth).or_default().push(id);
        }

        Ok((0..=max_depth)
            .map(|depth| by_depth.remove(&depth).unwrap_or_default())
            .collect())
    }

    /// Fail every RUNNING task whose heartbeat exceeded its execution
    /// timeout, cascading like `fail_task`. Returns `(task, cancelled)`
    /// pairs.
    #[instrument(skip(self), err)]
    pub async fn handle_stale_tasks(&self) -> DomainResult<Vec<(Uuid, Vec<Uuid>)>> {
        let stale = self.repo.get_stale_running_tasks().await?;
        let mut handled = Vec::with_capacity(stale.len());

        for task in stale {
            let message = format!(
                "Task execution exceeded timeout of {} seconds",
                task.max_execution_timeout_seconds
            );
            let cancelled = self.fail_task(task.id, &message).await?;
            handled.push((task.id, cancelled));
        }

        if !handled.is_empty() {
            warn!(count = handled.len(), "stale running tasks failed");
        }
        Ok(handled)
    }

    /// Bulk prune; the resolver cache is rebuilt afterwards since edges may
    /// have been deleted.
    #[instrument(skip(self, filters), err)]
    pub async fn prune_tasks(&self, filters: &PruneFilters) -> DomainResult<PruneResult> {
        let result = self.repo.prune_tasks(filters).await;
        self.resolver.invalidate().await;
        result
    }

    pub async fn get_task(&self, task_id: Uuid) -> DomainResult<Option<Task>> {
        self.repo.get_task(task_id).await
    }

    pub async fn list_tasks(&self, filters: &TaskFilters) -> DomainResult<Vec<Task>> {
        self.repo.list_tasks(filters).await
    }

    pub async fn get_child_tasks(&self, parent_ids: &[Uuid]) -> DomainResult<Vec<Task>> {
        self.repo.get_child_tasks(parent_ids).await
    }

    pub async fn find_ids_by_prefix(&self, prefix: &str) -> DomainResult<Vec<Uuid>> {
        self.repo.find_ids_by_prefix(prefix).await
    }

    async fn refresh_priority(&self, task_id: Uuid) -> DomainResult<()> {
        let Some(mut task) = self.repo.get_task(task_id).await? else {
            warn!(task_id = %task_id, "task vanished during priority refresh");
            return Ok(());
        };
        let depth = self.resolver.calculate_dependency_depth(task_id).await?;
        self.calculator.update_task_priority(&mut task, depth);
        self.repo
            .update_priority_and_depth(task_id, task.calculated_priority, depth)
            .await
    }
}
