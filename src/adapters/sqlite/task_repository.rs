//! SQLite implementation of the `TaskRepository` port.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Agent, DependencyType, PruneFilters, PruneResult, QueueStats, Task, TaskDependency,
    TaskSource, TaskStatus,
};
use crate::domain::ports::{TaskFilters, TaskRepository};

/// Chunk size for `IN (...)` parameter lists. SQLite's default variable
/// limit is 999; 900 leaves room for queries that bind a chunk twice.
pub(crate) const SQL_IN_CHUNK: usize = 900;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const TASK_COLUMNS: &str = "id, prompt, summary, agent_type, priority, status, input_data, \
     result_data, error_message, retry_count, max_retries, max_execution_timeout_seconds, \
     submitted_at, started_at, completed_at, last_updated_at, created_by, parent_task_id, \
     session_id, source, calculated_priority, deadline, estimated_duration_seconds, \
     dependency_depth, feature_branch, task_branch, worktree_path";

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert_task(&self, task: &Task, prerequisites: &[Uuid]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        let input_json = task
            .input_data
            .as_ref()
            .map_or_else(|| Ok("{}".to_string()), serde_json::to_string)?;
        let result_json = task
            .result_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO tasks (id, prompt, summary, agent_type, priority, status, input_data, \
             result_data, error_message, retry_count, max_retries, \
             max_execution_timeout_seconds, submitted_at, started_at, completed_at, \
             last_updated_at, created_by, parent_task_id, session_id, source, \
             calculated_priority, deadline, estimated_duration_seconds, dependency_depth, \
             feature_branch, task_branch, worktree_path) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(&task.prompt)
        .bind(&task.summary)
        .bind(&task.agent_type)
        .bind(i64::from(task.base_priority))
        .bind(task.status.as_str())
        .bind(&input_json)
        .bind(result_json)
        .bind(&task.error_message)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(task.max_execution_timeout_seconds as i64)
        .bind(task.submitted_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.last_updated_at.to_rfc3339())
        .bind(&task.created_by)
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&task.session_id)
        .bind(task.source.as_str())
        .bind(task.calculated_priority)
        .bind(task.deadline.map(|t| t.to_rfc3339()))
        .bind(task.estimated_duration_seconds.map(|s| s as i64))
        .bind(i64::from(task.dependency_depth))
        .bind(&task.feature_branch)
        .bind(&task.task_branch)
        .bind(&task.worktree_path)
        .execute(&mut *tx)
        .await?;

        for prereq_id in prerequisites {
            let edge = TaskDependency::new(task.id, *prereq_id);
            sqlx::query(
                "INSERT INTO task_dependencies (id, dependent_task_id, prerequisite_task_id, \
                 dependency_type, created_at, resolved_at) VALUES (?, ?, ?, ?, ?, NULL)",
            )
            .bind(edge.id.to_string())
            .bind(edge.dependent_task_id.to_string())
            .bind(edge.prerequisite_task_id.to_string())
            .bind(edge.dependency_type.as_str())
            .bind(edge.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| task_from_row(&r)).transpose()
    }

    async fn get_tasks(&self, ids: &[Uuid]) -> DomainResult<Vec<Task>> {
        let mut tasks = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(SQL_IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.to_string());
            }
            for row in query.fetch_all(&self.pool).await? {
                tasks.push(task_from_row(&row)?);
            }
        }
        Ok(tasks)
    }

    async fn list_tasks(&self, filters: &TaskFilters) -> DomainResult<Vec<Task>> {
        let (where_sql, params) = filters_where_clause(filters);
        let limit_sql = filters
            .limit
            .map_or_else(String::new, |l| format!(" LIMIT {l}"));
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {where_sql} \
             ORDER BY submitted_at DESC{limit_sql}"
        );

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = query.bind(param);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(task_from_row)
            .collect()
    }

    async fn count_tasks(&self, filters: &TaskFilters) -> DomainResult<u64> {
        let (where_sql, params) = filters_where_clause(filters);
        let sql = format!("SELECT COUNT(*) FROM tasks WHERE {where_sql}");

        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        for param in &params {
            query = query.bind(param);
        }

        let (count,) = query.fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn update_task(&self, task: &Task) -> DomainResult<()> {
        let input_json = task
            .input_data
            .as_ref()
            .map_or_else(|| Ok("{}".to_string()), serde_json::to_string)?;
        let result_json = task
            .result_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "UPDATE tasks SET prompt = ?, summary = ?, agent_type = ?, priority = ?, \
             status = ?, input_data = ?, result_data = ?, error_message = ?, retry_count = ?, \
             max_retries = ?, max_execution_timeout_seconds = ?, started_at = ?, \
             completed_at = ?, last_updated_at = ?, created_by = ?, session_id = ?, \
             calculated_priority = ?, deadline = ?, estimated_duration_seconds = ?, \
             dependency_depth = ?, feature_branch = ?, task_branch = ?, worktree_path = ? \
             WHERE id = ?",
        )
        .bind(&task.prompt)
        .bind(&task.summary)
        .bind(&task.agent_type)
        .bind(i64::from(task.base_priority))
        .bind(task.status.as_str())
        .bind(&input_json)
        .bind(result_json)
        .bind(&task.error_message)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(task.max_execution_timeout_seconds as i64)
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.last_updated_at.to_rfc3339())
        .bind(&task.created_by)
        .bind(&task.session_id)
        .bind(task.calculated_priority)
        .bind(task.deadline.map(|t| t.to_rfc3339()))
        .bind(task.estimated_duration_seconds.map(|s| s as i64))
        .bind(i64::from(task.dependency_depth))
        .bind(&task.feature_branch)
        .bind(&task.task_branch)
        .bind(&task.worktree_path)
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }
        Ok(())
    }

    async fn update_priority_and_depth(
        &self,
        id: Uuid,
        calculated_priority: f64,
        dependency_depth: u32,
    ) -> DomainResult<()> {
        sqlx::query(
            "UPDATE tasks SET calculated_priority = ?, dependency_depth = ? WHERE id = ?",
        )
        .bind(calculated_priority)
        .bind(i64::from(dependency_depth))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dequeue_next_task(&self) -> DomainResult<Option<Task>> {
        // Claim loop: pick the head of the READY index, then take it with a
        // conditional UPDATE. Losing the race just means another worker got
        // the row; re-select until the READY set is empty.
        loop {
            let candidate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM tasks WHERE status = 'ready' \
                 ORDER BY calculated_priority DESC, submitted_at ASC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await?;

            let Some((id_str,)) = candidate else {
                return Ok(None);
            };
            let id = super::parse_uuid(&id_str)?;

            let now = Utc::now().to_rfc3339();
            let claimed = sqlx::query(
                "UPDATE tasks SET status = 'running', started_at = ?, last_updated_at = ? \
                 WHERE id = ? AND status = 'ready'",
            )
            .bind(&now)
            .bind(&now)
            .bind(&id_str)
            .execute(&self.pool)
            .await?;

            if claimed.rows_affected() == 1 {
                return self.get_task(id).await;
            }
        }
    }

    async fn get_stale_running_tasks(&self) -> DomainResult<Vec<Task>> {
        sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'running' \
             AND (julianday('now') - julianday(last_updated_at)) * 86400.0 \
                 > max_execution_timeout_seconds"
        ))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(task_from_row)
        .collect()
    }

    async fn get_child_tasks(&self, parent_ids: &[Uuid]) -> DomainResult<Vec<Task>> {
        let mut children = Vec::new();
        for chunk in parent_ids.chunks(SQL_IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_task_id IN ({placeholders}) \
                 ORDER BY submitted_at ASC"
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.to_string());
            }
            for row in query.fetch_all(&self.pool).await? {
                children.push(task_from_row(&row)?);
            }
        }
        Ok(children)
    }

    async fn find_ids_by_prefix(&self, prefix: &str) -> DomainResult<Vec<Uuid>> {
        let pattern = format!("{prefix}%");
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM tasks WHERE id LIKE ?")
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|(id,)| super::parse_uuid(id)).collect()
    }

    async fn insert_dependency(&self, edge: &TaskDependency) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO task_dependencies (id, dependent_task_id, prerequisite_task_id, \
             dependency_type, created_at, resolved_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(edge.id.to_string())
        .bind(edge.dependent_task_id.to_string())
        .bind(edge.prerequisite_task_id.to_string())
        .bind(edge.dependency_type.as_str())
        .bind(edge.created_at.to_rfc3339())
        .bind(edge.resolved_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dependencies_for(&self, task_id: Uuid) -> DomainResult<Vec<TaskDependency>> {
        sqlx::query(
            "SELECT id, dependent_task_id, prerequisite_task_id, dependency_type, created_at, \
             resolved_at FROM task_dependencies WHERE dependent_task_id = ?",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(edge_from_row)
        .collect()
    }

    async fn get_dependent_ids(&self, prerequisite_id: Uuid) -> DomainResult<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT dependent_task_id FROM task_dependencies \
             WHERE prerequisite_task_id = ? AND resolved_at IS NULL",
        )
        .bind(prerequisite_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|(id,)| super::parse_uuid(id)).collect()
    }

    async fn unresolved_edges(&self) -> DomainResult<Vec<TaskDependency>> {
        sqlx::query(
            "SELECT id, dependent_task_id, prerequisite_task_id, dependency_type, created_at, \
             resolved_at FROM task_dependencies WHERE resolved_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(edge_from_row)
        .collect()
    }

    async fn complete_task_transition(&self, id: Uuid) -> DomainResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> = sqlx::query_as("SELECT status FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DomainError::TaskNotFound(id));
        }

        // Terminal statuses are sinks. The status guard on the UPDATE is the
        // authoritative check; a concurrent cascade may have terminated the
        // task after the existence read, and zero rows affected means the
        // transition did not happen.
        let now = Utc::now().to_rfc3339();
        let transitioned = sqlx::query(
            "UPDATE tasks SET status = 'completed', completed_at = ?, last_updated_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if transitioned.rows_affected() == 0 {
            return Ok(Vec::new());
        }

        sqlx::query(
            "UPDATE task_dependencies SET resolved_at = ? \
             WHERE prerequisite_task_id = ? AND resolved_at IS NULL",
        )
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        let dependents: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT dependent_task_id FROM task_dependencies \
             WHERE prerequisite_task_id = ?",
        )
        .bind(id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        let mut unblocked = Vec::new();
        for (dependent_str,) in dependents {
            let (pending_edges,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM task_dependencies \
                 WHERE dependent_task_id = ? AND resolved_at IS NULL",
            )
            .bind(&dependent_str)
            .fetch_one(&mut *tx)
            .await?;

            if pending_edges == 0 {
                let flipped = sqlx::query(
                    "UPDATE tasks SET status = 'ready', last_updated_at = ? \
                     WHERE id = ? AND status = 'blocked'",
                )
                .bind(&now)
                .bind(&dependent_str)
                .execute(&mut *tx)
                .await?;

                if flipped.rows_affected() == 1 {
                    unblocked.push(super::parse_uuid(&dependent_str)?);
                }
            }
        }

        tx.commit().await?;
        Ok(unblocked)
    }

    async fn terminate_with_cascade(
        &self,
        id: Uuid,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> DomainResult<Vec<Uuid>> {
        if !matches!(status, TaskStatus::Failed | TaskStatus::Cancelled) {
            return Err(DomainError::Validation(format!(
                "terminate_with_cascade requires failed or cancelled, got {status}"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> = sqlx::query_as("SELECT status FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DomainError::TaskNotFound(id));
        }

        // Same guard as completion: a task another cascade already drove to
        // a terminal status must keep it. Zero rows affected means no
        // transition happened, so no cascade either.
        let now = Utc::now().to_rfc3339();
        let transitioned = sqlx::query(
            "UPDATE tasks SET status = ?, error_message = COALESCE(?, error_message), \
             completed_at = ?, last_updated_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(status.as_str())
        .bind(&error_message)
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if transitioned.rows_affected() == 0 {
            return Ok(Vec::new());
        }

        // Transitive closure over unresolved edges only; resolved edges no
        // longer gate their dependents.
        let descendants: Vec<(String,)> = sqlx::query_as(
            "WITH RECURSIVE descendants(id) AS (
                 SELECT dependent_task_id FROM task_dependencies
                     WHERE prerequisite_task_id = ? AND resolved_at IS NULL
                 UNION
                 SELECT td.dependent_task_id FROM task_dependencies td
                     JOIN descendants d ON td.prerequisite_task_id = d.id
                     WHERE td.resolved_at IS NULL
             )
             SELECT id FROM descendants",
        )
        .bind(id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        let mut cancelled = Vec::with_capacity(descendants.len());
        for chunk in descendants.chunks(SQL_IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "UPDATE tasks SET status = 'cancelled', completed_at = ?, last_updated_at = ? \
                 WHERE id IN ({placeholders}) \
                 AND status NOT IN ('completed', 'failed', 'cancelled')"
            );
            let mut query = sqlx::query(&sql).bind(&now).bind(&now);
            for (dep_id,) in chunk {
                query = query.bind(dep_id.as_str());
            }
            query.execute(&mut *tx).await?;

            for (dep_id,) in chunk {
                cancelled.push(super::parse_uuid(dep_id)?);
            }
        }

        tx.commit().await?;
        Ok(cancelled)
    }

    async fn prune_tasks(&self, filters: &PruneFilters) -> DomainResult<PruneResult> {
        self.prune_tasks_impl(filters).await
    }

    async fn queue_stats(&self) -> DomainResult<QueueStats> {
        let rows: Vec<(String, i64, Option<f64>)> = sqlx::query_as(
            "SELECT status, COUNT(*), AVG(calculated_priority) FROM tasks GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        let mut weighted_priority = 0.0;
        for (status, count, avg_priority) in rows {
            if let Some(status) = TaskStatus::from_str(&status) {
                let count = count.max(0) as u64;
                stats.status_counts.insert(status, count);
                stats.total_tasks += count;
                weighted_priority += avg_priority.unwrap_or(0.0) * count as f64;
            }
        }
        if stats.total_tasks > 0 {
            stats.avg_priority = weighted_priority / stats.total_tasks as f64;
        }

        let (max_depth,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(dependency_depth) FROM tasks")
                .fetch_one(&self.pool)
                .await?;
        stats.max_depth = max_depth.unwrap_or(0).max(0) as u32;

        let oldest_pending: Option<(String,)> = sqlx::query_as(
            "SELECT submitted_at FROM tasks WHERE status IN ('pending', 'blocked') \
             ORDER BY submitted_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        stats.oldest_pending = oldest_pending
            .map(|(s,)| super::parse_datetime(&s))
            .transpose()?;

        let newest: Option<(String,)> =
            sqlx::query_as("SELECT submitted_at FROM tasks ORDER BY submitted_at DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        stats.newest_task = newest.map(|(s,)| super::parse_datetime(&s)).transpose()?;

        Ok(stats)
    }

    async fn insert_agent(&self, agent: &Agent) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO agents (id, name, specialization, task_id, state, model, spawned_at, \
             terminated_at, session_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(agent.id.to_string())
        .bind(&agent.name)
        .bind(&agent.specialization)
        .bind(agent.task_id.to_string())
        .bind(agent.state.as_str())
        .bind(&agent.model)
        .bind(agent.spawned_at.to_rfc3339())
        .bind(agent.terminated_at.map(|t| t.to_rfc3339()))
        .bind(&agent.session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_checkpoint(
        &self,
        task_id: Uuid,
        iteration: u32,
        state: &serde_json::Value,
    ) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO checkpoints (task_id, iteration, state, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(task_id.to_string())
        .bind(i64::from(iteration))
        .bind(serde_json::to_string(state)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_audit(
        &self,
        agent_id: Option<Uuid>,
        task_id: Option<Uuid>,
        action_type: &str,
        action_data: Option<&serde_json::Value>,
    ) -> DomainResult<()> {
        let data_json = action_data.map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT INTO audit (timestamp, agent_id, task_id, action_type, action_data) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(agent_id.map(|id| id.to_string()))
        .bind(task_id.map(|id| id.to_string()))
        .bind(action_type)
        .bind(data_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_state(
        &self,
        task_id: Uuid,
        key: &str,
        value: &serde_json::Value,
    ) -> DomainResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO state (task_id, key, value, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(task_id, key) DO UPDATE SET value = excluded.value, \
             updated_at = excluded.updated_at",
        )
        .bind(task_id.to_string())
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn foreign_key_check(&self) -> DomainResult<Vec<String>> {
        let rows = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let table: String = row.try_get(0).unwrap_or_default();
                let rowid: Option<i64> = row.try_get(1).ok();
                let parent: String = row.try_get(2).unwrap_or_default();
                format!(
                    "{table} row {} violates FK to {parent}",
                    rowid.map_or_else(|| "?".to_string(), |r| r.to_string())
                )
            })
            .collect())
    }
}

/// Build a WHERE clause from list filters. Returns the clause (without the
/// `WHERE` keyword) and its positional string parameters.
fn filters_where_clause(filters: &TaskFilters) -> (String, Vec<String>) {
    let mut clauses = vec!["1=1".to_string()];
    let mut params = Vec::new();

    if let Some(status) = filters.status {
        clauses.push("status = ?".to_string());
        params.push(status.as_str().to_string());
    }
    if let Some(exclude) = filters.exclude_status {
        clauses.push("status != ?".to_string());
        params.push(exclude.as_str().to_string());
    }
    if let Some(source) = filters.source {
        clauses.push("source = ?".to_string());
        params.push(source.as_str().to_string());
    }
    if let Some(agent_type) = &filters.agent_type {
        clauses.push("agent_type = ?".to_string());
        params.push(agent_type.clone());
    }
    if let Some(feature_branch) = &filters.feature_branch {
        clauses.push("feature_branch = ?".to_string());
        params.push(feature_branch.clone());
    }
    if let Some(parent) = filters.parent_task_id {
        clauses.push("parent_task_id = ?".to_string());
        params.push(parent.to_string());
    }
    if let Some(session) = &filters.session_id {
        clauses.push("session_id = ?".to_string());
        params.push(session.clone());
    }

    (clauses.join(" AND "), params)
}

pub(crate) fn task_from_row(row: &SqliteRow) -> DomainResult<Task> {
    let status_str: String = row.try_get("status").map_err(DomainError::from)?;
    let status = TaskStatus::from_str(&status_str)
        .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {status_str}")))?;

    let source_str: String = row.try_get("source").map_err(DomainError::from)?;
    let source = TaskSource::from_str(&source_str)
        .ok_or_else(|| DomainError::Serialization(format!("Invalid source: {source_str}")))?;

    let id: String = row.try_get("id").map_err(DomainError::from)?;
    let parent: Option<String> = row.try_get("parent_task_id").map_err(DomainError::from)?;
    let submitted_at: String = row.try_get("submitted_at").map_err(DomainError::from)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(DomainError::from)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(DomainError::from)?;
    let last_updated_at: String = row.try_get("last_updated_at").map_err(DomainError::from)?;
    let deadline: Option<String> = row.try_get("deadline").map_err(DomainError::from)?;
    let input_data: Option<String> = row.try_get("input_data").map_err(DomainError::from)?;
    let result_data: Option<String> = row.try_get("result_data").map_err(DomainError::from)?;

    let retry_count: i64 = row.try_get("retry_count").map_err(DomainError::from)?;
    let max_retries: i64 = row.try_get("max_retries").map_err(DomainError::from)?;
    let timeout: i64 = row
        .try_get("max_execution_timeout_seconds")
        .map_err(DomainError::from)?;
    let base_priority: i64 = row.try_get("priority").map_err(DomainError::from)?;
    let dependency_depth: i64 = row.try_get("dependency_depth").map_err(DomainError::from)?;
    let estimated: Option<i64> = row
        .try_get("estimated_duration_seconds")
        .map_err(DomainError::from)?;

    Ok(Task {
        id: super::parse_uuid(&id)?,
        prompt: row.try_get("prompt").map_err(DomainError::from)?,
        summary: row.try_get("summary").map_err(DomainError::from)?,
        agent_type: row.try_get("agent_type").map_err(DomainError::from)?,
        base_priority: u8::try_from(base_priority)
            .map_err(|_| DomainError::Serialization(format!("priority out of range: {base_priority}")))?,
        calculated_priority: row
            .try_get("calculated_priority")
            .map_err(DomainError::from)?,
        status,
        source,
        dependency_depth: dependency_depth.max(0) as u32,
        input_data: super::parse_optional_json(input_data)?,
        result_data: super::parse_optional_json(result_data)?,
        error_message: row.try_get("error_message").map_err(DomainError::from)?,
        retry_count: retry_count.max(0) as u32,
        max_retries: max_retries.max(0) as u32,
        max_execution_timeout_seconds: timeout.max(0) as u64,
        submitted_at: super::parse_datetime(&submitted_at)?,
        started_at: super::parse_optional_datetime(started_at)?,
        completed_at: super::parse_optional_datetime(completed_at)?,
        last_updated_at: super::parse_datetime(&last_updated_at)?,
        created_by: row.try_get("created_by").map_err(DomainError::from)?,
        parent_task_id: super::parse_optional_uuid(parent)?,
        session_id: row.try_get("session_id").map_err(DomainError::from)?,
        deadline: super::parse_optional_datetime(deadline)?,
        estimated_duration_seconds: estimated.map(|s| s.max(0) as u64),
        feature_branch: row.try_get("feature_branch").map_err(DomainError::from)?,
        task_branch: row.try_get("task_branch").map_err(DomainError::from)?,
        worktree_path: row.try_get("worktree_path").map_err(DomainError::from)?,
    })
}

fn edge_from_row(row: &SqliteRow) -> DomainResult<TaskDependency> {
    let id: String = row.try_get("id").map_err(DomainError::from)?;
    let dependent: String = row.try_get("dependent_task_id").map_err(DomainError::from)?;
    let prerequisite: String = row
        .try_get("prerequisite_task_id")
        .map_err(DomainError::from)?;
    let dep_type: String = row.try_get("dependency_type").map_err(DomainError::from)?;
    let created_at: String = row.try_get("created_at").map_err(DomainError::from)?;
    let resolved_at: Option<String> = row.try_get("resolved_at").map_err(DomainError::from)?;

    Ok(TaskDependency {
        id: super::parse_uuid(&id)?,
        dependent_task_id: super::parse_uuid(&dependent)?,
        prerequisite_task_id: super::parse_uuid(&prerequisite)?,
        dependency_type: DependencyType::from_str(&dep_type)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid dependency type: {dep_type}")))?,
        created_at: super::parse_datetime(&created_at)?,
        resolved_at: super::parse_optional_datetime(resolved_at)?,
    })
}
