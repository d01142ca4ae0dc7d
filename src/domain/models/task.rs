//! Task domain model.
//!
//! Tasks are discrete units of work that agents execute.
//! They form a DAG through prerequisite edges (see [`super::dependency`]);
//! parent/child lineage is advisory and never blocks scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a task summary.
pub const MAX_SUMMARY_LEN: usize = 140;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but readiness has not been established
    Pending,
    /// Task has at least one prerequisite that is not completed
    Blocked,
    /// All prerequisites completed; eligible for dequeue
    Ready,
    /// Task is currently being executed
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed during execution
    Failed,
    /// Task was cancelled (directly or by cascade)
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "blocked" => Some(Self::Blocked),
            "ready" => Some(Self::Ready),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// All status values, in lifecycle order. Used for error messages that
    /// must list the valid set.
    pub fn all() -> &'static [TaskStatus] {
        &[
            Self::Pending,
            Self::Blocked,
            Self::Ready,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active (non-terminal) state.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid transitions from this status.
    ///
    /// Terminal statuses are sinks; the only way out is an explicit retry,
    /// which resets the execution epoch and is represented here as
    /// `Failed/Cancelled -> Pending | Ready`.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Ready, Self::Blocked, Self::Cancelled],
            Self::Blocked => &[Self::Ready, Self::Cancelled],
            Self::Ready => &[Self::Running, Self::Blocked, Self::Pending, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed => &[],
            Self::Failed => &[Self::Pending, Self::Ready],
            Self::Cancelled => &[Self::Pending, Self::Ready],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Submitted directly by a human
    Human,
    /// Spawned by the requirements-gathering agent
    AgentRequirements,
    /// Spawned by the planning agent
    AgentPlanner,
    /// Spawned by an implementation agent
    AgentImplementation,
}

impl Default for TaskSource {
    fn default() -> Self {
        Self::Human
    }
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::AgentRequirements => "agent_requirements",
            Self::AgentPlanner => "agent_planner",
            Self::AgentImplementation => "agent_implementation",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "agent_requirements" => Some(Self::AgentRequirements),
            "agent_planner" => Some(Self::AgentPlanner),
            "agent_implementation" => Some(Self::AgentImplementation),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete unit of work that can be executed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, assigned at creation and never reused
    pub id: Uuid,
    /// Full instruction for the executing agent
    pub prompt: String,
    /// Short human label (at most [`MAX_SUMMARY_LEN`] chars)
    pub summary: String,
    /// Executor specialization name
    pub agent_type: String,
    /// User-specified priority in [0, 10]
    pub base_priority: u8,
    /// Composite score maintained by the priority calculator
    pub calculated_priority: f64,
    /// Current status
    pub status: TaskStatus,
    /// Where this task originated from
    pub source: TaskSource,
    /// Depth in the unresolved-prerequisite graph (0 = no unresolved prereqs)
    pub dependency_depth: u32,
    /// Free-form input payload, persisted as opaque JSON
    pub input_data: Option<serde_json::Value>,
    /// Free-form result payload, persisted as opaque JSON
    pub result_data: Option<serde_json::Value>,
    /// Failure description, set when status becomes Failed
    pub error_message: Option<String>,
    /// Retry count for the current task
    pub retry_count: u32,
    /// Maximum retries
    pub max_retries: u32,
    /// Execution budget; overruns are caught by stale detection
    pub max_execution_timeout_seconds: u64,
    /// When submitted
    pub submitted_at: DateTime<Utc>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Monotone-updated on every mutation
    pub last_updated_at: DateTime<Utc>,
    /// Submitter identity (optional)
    pub created_by: Option<String>,
    /// Lineage parent; advisory, immutable after creation
    pub parent_task_id: Option<Uuid>,
    /// Session correlation (optional)
    pub session_id: Option<String>,
    /// Optional deadline for urgency boosting
    pub deadline: Option<DateTime<Utc>>,
    /// Estimated execution time in seconds (optional)
    pub estimated_duration_seconds: Option<u64>,
    /// Feature branch this task's changes merge into (passthrough)
    pub feature_branch: Option<String>,
    /// Individual task branch (passthrough)
    pub task_branch: Option<String>,
    /// Worktree path if using git isolation (passthrough)
    pub worktree_path: Option<String>,
}

impl Task {
    /// Create a new task from a prompt. The summary is auto-derived.
    pub fn new(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let now = Utc::now();
        let source = TaskSource::default();
        Self {
            id: Uuid::new_v4(),
            summary: derive_summary(&prompt, source),
            prompt,
            agent_type: "requirements-gatherer".to_string(),
            base_priority: 5,
            calculated_priority: 0.0,
            status: TaskStatus::default(),
            source,
            dependency_depth: 0,
            input_data: None,
            result_data: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            max_execution_timeout_seconds: 3600,
            submitted_at: now,
            started_at: None,
            completed_at: None,
            last_updated_at: now,
            created_by: None,
            parent_task_id: None,
            session_id: None,
            deadline: None,
            estimated_duration_seconds: None,
            feature_branch: None,
            task_branch: None,
            worktree_path: None,
        }
    }

    /// Set an explicit summary (truncated to [`MAX_SUMMARY_LEN`]).
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = truncate_chars(summary.into().trim(), MAX_SUMMARY_LEN);
        self
    }

    /// Set task source and re-derive the summary if it was auto-generated.
    pub fn with_source(mut self, source: TaskSource) -> Self {
        let auto = self.summary == derive_summary(&self.prompt, self.source);
        self.source = source;
        if auto {
            self.summary = derive_summary(&self.prompt, source);
        }
        self
    }

    /// Set base priority. Range validation happens at enqueue.
    pub fn with_priority(mut self, base_priority: u8) -> Self {
        self.base_priority = base_priority;
        self
    }

    /// Set agent type.
    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    /// Set lineage parent.
    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    /// Set deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set input payload.
    pub fn with_input_data(mut self, input_data: serde_json::Value) -> Self {
        self.input_data = Some(input_data);
        self
    }

    /// Set session correlation.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Validate submittable fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Task prompt cannot be empty".to_string());
        }
        if self.summary.chars().count() > MAX_SUMMARY_LEN {
            return Err(format!(
                "Task summary exceeds {MAX_SUMMARY_LEN} characters"
            ));
        }
        if self.base_priority > 10 {
            return Err(format!(
                "base_priority must be in range [0, 10], got {}",
                self.base_priority
            ));
        }
        Ok(())
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, stamping timestamps consistently.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        self.last_updated_at = Utc::now();

        match new_status {
            TaskStatus::Running => self.started_at = Some(Utc::now()),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether an explicit retry is allowed from the current state.
    pub fn can_retry(&self) -> bool {
        matches!(self.status, TaskStatus::Failed | TaskStatus::Cancelled)
            && self.retry_count < self.max_retries
    }

    /// Begin a fresh execution epoch: clears execution timestamps and the
    /// error message, bumps the retry count, and returns to the given
    /// (Pending or Ready) status.
    pub fn retry(&mut self, into: TaskStatus) -> Result<(), String> {
        if !self.can_retry() {
            return Err(
                "Cannot retry: task is not failed/cancelled or max retries reached".to_string(),
            );
        }
        if !matches!(into, TaskStatus::Pending | TaskStatus::Ready) {
            return Err(format!("Retry must target pending or ready, got {into}"));
        }
        self.retry_count += 1;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
        self.transition_to(into)
    }
}

/// Derive a summary from a prompt per source.
///
/// Human submissions are prefixed so agent-facing listings distinguish raw
/// user text from agent-generated work items. The result never exceeds
/// [`MAX_SUMMARY_LEN`] characters.
pub fn derive_summary(prompt: &str, source: TaskSource) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return "Task".to_string();
    }
    let summary = match source {
        TaskSource::Human => format!("User Prompt: {}", truncate_chars(trimmed, 126)),
        _ => truncate_chars(trimmed, MAX_SUMMARY_LEN),
    };
    truncate_chars(summary.trim(), MAX_SUMMARY_LEN)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation_from_prompt() {
        let task = Task::new("Implement the login feature");
        assert_eq!(task.prompt, "Implement the login feature");
        assert_eq!(task.summary, "User Prompt: Implement the login feature");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.base_priority, 5);
        assert_eq!(task.max_retries, 3);
        assert_eq!(task.max_execution_timeout_seconds, 3600);
    }

    #[test]
    fn test_derive_summary_human_prefix_and_cap() {
        let long: String = "x".repeat(300);
        let summary = derive_summary(&long, TaskSource::Human);
        assert!(summary.starts_with("User Prompt: "));
        assert_eq!(summary.chars().count(), "User Prompt: ".len() + 126);
        assert!(summary.chars().count() <= MAX_SUMMARY_LEN);

        let agent_summary = derive_summary(&long, TaskSource::AgentPlanner);
        assert_eq!(agent_summary.chars().count(), MAX_SUMMARY_LEN);
    }

    #[test]
    fn test_derive_summary_empty_prompt() {
        assert_eq!(derive_summary("   ", TaskSource::Human), "Task");
    }

    #[test]
    fn test_with_source_rederives_auto_summary() {
        let task = Task::new("do the thing").with_source(TaskSource::AgentPlanner);
        assert_eq!(task.summary, "do the thing");

        let task = Task::new("do the thing")
            .with_summary("custom")
            .with_source(TaskSource::AgentPlanner);
        assert_eq!(task.summary, "custom");
    }

    #[test]
    fn test_state_transitions() {
        let mut task = Task::new("Test task");

        task.transition_to(TaskStatus::Ready).unwrap();
        task.transition_to(TaskStatus::Running).unwrap();
        assert!(task.started_at.is_some());

        task.transition_to(TaskStatus::Completed).unwrap();
        assert!(task.completed_at.is_some());
        assert!(task.is_terminal());
    }

    #[test]
    fn test_invalid_transitions() {
        // Pending -> Running must go through Ready
        let mut t = Task::new("p");
        assert!(t.transition_to(TaskStatus::Running).is_err());

        // Blocked -> Running must go through Ready
        let mut t = Task::new("p");
        t.transition_to(TaskStatus::Blocked).unwrap();
        assert!(t.transition_to(TaskStatus::Running).is_err());

        // Ready -> Completed must go through Running
        let mut t = Task::new("p");
        t.transition_to(TaskStatus::Ready).unwrap();
        assert!(t.transition_to(TaskStatus::Completed).is_err());
    }

    #[test]
    fn test_terminal_statuses_are_sinks() {
        let mut t = Task::new("p");
        t.transition_to(TaskStatus::Ready).unwrap();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Completed).unwrap();

        for target in TaskStatus::all() {
            assert!(t.transition_to(*target).is_err());
        }
    }

    #[test]
    fn test_retry_resets_execution_epoch() {
        let mut t = Task::new("p");
        t.transition_to(TaskStatus::Ready).unwrap();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Failed).unwrap();
        t.error_message = Some("boom".to_string());

        assert!(t.can_retry());
        t.retry(TaskStatus::Ready).unwrap();

        assert_eq!(t.status, TaskStatus::Ready);
        assert_eq!(t.retry_count, 1);
        assert!(t.started_at.is_none());
        assert!(t.completed_at.is_none());
        assert!(t.error_message.is_none());
    }

    #[test]
    fn test_retry_exhaustion() {
        let mut t = Task::new("p");
        t.max_retries = 1;
        t.transition_to(TaskStatus::Ready).unwrap();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Failed).unwrap();

        t.retry(TaskStatus::Ready).unwrap();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Failed).unwrap();

        assert!(!t.can_retry());
        assert!(t.retry(TaskStatus::Ready).is_err());
    }

    #[test]
    fn test_validate_priority_range() {
        let t = Task::new("p").with_priority(11);
        assert!(t.validate().is_err());

        let t = Task::new("p").with_priority(10);
        assert!(t.validate().is_ok());

        let t = Task::new("p").with_priority(0);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_status_round_trip() {
        for status in TaskStatus::all() {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(*status));
        }
        // Legacy spellings accepted
        assert_eq!(TaskStatus::from_str("complete"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::from_str("canceled"), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }
}
