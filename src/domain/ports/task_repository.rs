//! Task store port.
//!
//! The store is the single authoritative persistent state; all coordination
//! between workers happens through its transactions. Multi-statement
//! mutations (enqueue with edges, completion with edge resolution, cascade,
//! prune) are exposed as single atomic operations so callers can never
//! observe partial state.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Agent, PruneFilters, PruneResult, QueueStats, Task, TaskDependency, TaskSource, TaskStatus,
};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub exclude_status: Option<TaskStatus>,
    pub source: Option<TaskSource>,
    pub agent_type: Option<String>,
    pub feature_branch: Option<String>,
    pub parent_task_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub limit: Option<u32>,
}

impl TaskFilters {
    pub fn by_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Repository interface for task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a task together with its prerequisite edges in one transaction.
    async fn insert_task(&self, task: &Task, prerequisites: &[Uuid]) -> DomainResult<()>;

    /// Get a task by id.
    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Get several tasks by id (missing ids are silently absent).
    async fn get_tasks(&self, ids: &[Uuid]) -> DomainResult<Vec<Task>>;

    /// List tasks matching the filters, newest first.
    async fn list_tasks(&self, filters: &TaskFilters) -> DomainResult<Vec<Task>>;

    /// Count tasks matching the filters.
    async fn count_tasks(&self, filters: &TaskFilters) -> DomainResult<u64>;

    /// Full-row update. Errors with `TaskNotFound` when the row is missing.
    async fn update_task(&self, task: &Task) -> DomainResult<()>;

    /// Persist a recomputed `(calculated_priority, dependency_depth)` pair.
    /// Idempotent: the values depend only on stored state.
    async fn update_priority_and_depth(
        &self,
        id: Uuid,
        calculated_priority: f64,
        dependency_depth: u32,
    ) -> DomainResult<()>;

    /// Atomically claim the highest-priority READY task and transition it to
    /// RUNNING (conditional UPDATE, not read-then-write). `None` when the
    /// READY set is empty.
    async fn dequeue_next_task(&self) -> DomainResult<Option<Task>>;

    /// RUNNING tasks whose `last_updated_at` is older than their
    /// `max_execution_timeout_seconds`.
    async fn get_stale_running_tasks(&self) -> DomainResult<Vec<Task>>;

    /// Direct children of the given parents, in one query.
    async fn get_child_tasks(&self, parent_ids: &[Uuid]) -> DomainResult<Vec<Task>>;

    /// Resolve full ids from a hex prefix (for CLI short ids).
    async fn find_ids_by_prefix(&self, prefix: &str) -> DomainResult<Vec<Uuid>>;

    /// Insert a dependency edge.
    async fn insert_dependency(&self, edge: &TaskDependency) -> DomainResult<()>;

    /// Edges where the given task is the dependent.
    async fn get_dependencies_for(&self, task_id: Uuid) -> DomainResult<Vec<TaskDependency>>;

    /// Ids of direct dependents of the given prerequisite (unresolved edges).
    async fn get_dependent_ids(&self, prerequisite_id: Uuid) -> DomainResult<Vec<Uuid>>;

    /// All unresolved edges (the scheduling graph).
    async fn unresolved_edges(&self) -> DomainResult<Vec<TaskDependency>>;

    /// Single transaction: mark the task COMPLETED, resolve its outgoing
    /// edges, flip every fully-satisfied BLOCKED dependent to READY.
    /// Returns the newly-READY ids. Terminal statuses are sinks: a task
    /// already COMPLETED, FAILED, or CANCELLED is left untouched and the
    /// call is a no-op (empty result).
    async fn complete_task_transition(&self, id: Uuid) -> DomainResult<Vec<Uuid>>;

    /// Single transaction: transition the task to FAILED or CANCELLED and
    /// cancel its transitive unresolved-edge descendants in one bulk update.
    /// Returns the cancelled descendant ids. Terminal statuses are sinks: a
    /// task already in any terminal status is left untouched and the call
    /// is a no-op, and terminal descendants keep their status.
    async fn terminate_with_cascade(
        &self,
        id: Uuid,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> DomainResult<Vec<Uuid>>;

    /// Bulk prune per the filters' referential rules.
    async fn prune_tasks(&self, filters: &PruneFilters) -> DomainResult<PruneResult>;

    /// Aggregate queue statistics: one GROUP BY over status plus scalar
    /// queries for max depth, oldest pending, and newest task.
    async fn queue_stats(&self) -> DomainResult<QueueStats>;

    /// Insert an agent record (cascades away with its task).
    async fn insert_agent(&self, agent: &Agent) -> DomainResult<()>;

    /// Insert a checkpoint row for a task iteration.
    async fn insert_checkpoint(
        &self,
        task_id: Uuid,
        iteration: u32,
        state: &serde_json::Value,
    ) -> DomainResult<()>;

    /// Append an audit row. `agent_id` survives prune as NULL.
    async fn log_audit(
        &self,
        agent_id: Option<Uuid>,
        task_id: Option<Uuid>,
        action_type: &str,
        action_data: Option<&serde_json::Value>,
    ) -> DomainResult<()>;

    /// Legacy key/value state row for a task.
    async fn set_state(
        &self,
        task_id: Uuid,
        key: &str,
        value: &serde_json::Value,
    ) -> DomainResult<()>;

    /// Run `PRAGMA foreign_key_check`; returns one description per violation.
    async fn foreign_key_check(&self) -> DomainResult<Vec<String>>;
}
