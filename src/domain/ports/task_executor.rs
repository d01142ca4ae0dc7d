//! Executor port: abstract task execution against an LLM backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Task;

/// Outcome of one task execution.
///
/// Business failures are reported with `success = false`; errors are
/// reserved for infrastructure problems, which the orchestrator converts
/// into a failed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(task_id: Uuid, data: Option<serde_json::Value>) -> Self {
        Self {
            task_id,
            agent_id: None,
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(task_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            task_id,
            agent_id: None,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Port for executing a task. Implementations must be safe to invoke
/// concurrently on distinct tasks and should bound their own duration by
/// `task.max_execution_timeout_seconds`; overruns are caught by the store's
/// stale-task query.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute_task(&self, task: &Task) -> DomainResult<ExecutionResult>;
}

/// Executor that acknowledges every task without doing any work.
///
/// Used when no backend is configured (dry runs, demos) and as the
/// baseline test double.
#[derive(Debug, Clone, Default)]
pub struct NullTaskExecutor;

#[async_trait]
impl TaskExecutor for NullTaskExecutor {
    async fn execute_task(&self, task: &Task) -> DomainResult<ExecutionResult> {
        tracing::debug!(task_id = %task.id, "null executor acknowledging task");
        Ok(ExecutionResult::success(
            task.id,
            Some(serde_json::json!({ "executor": "null" })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;

    #[tokio::test]
    async fn test_null_executor_succeeds() {
        let task = Task::new("anything");
        let result = NullTaskExecutor.execute_task(&task).await.unwrap();
        assert!(result.success);
        assert_eq!(result.task_id, task.id);
        assert!(result.error.is_none());
    }
}
