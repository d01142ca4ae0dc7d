//! Agent record model.
//!
//! Agents are owned by the execution layer; the queue core persists them
//! only to honor their cascade behavior when tasks are pruned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a spawned agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Spawning,
    Active,
    Terminated,
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Active => "active",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }
}

/// An agent bound to a task. Deleted by cascade when its task is pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub specialization: String,
    pub task_id: Uuid,
    pub state: AgentState,
    pub model: String,
    pub spawned_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
}

impl Agent {
    pub fn new(task_id: Uuid, specialization: impl Into<String>) -> Self {
        let specialization = specialization.into();
        Self {
            id: Uuid::new_v4(),
            name: format!("agent-{specialization}"),
            specialization,
            task_id,
            state: AgentState::Spawning,
            model: "default".to_string(),
            spawned_at: Utc::now(),
            terminated_at: None,
            session_id: None,
        }
    }
}
