//! Dependency edge domain model.
//!
//! A `TaskDependency` is a directed edge `dependent -> prerequisite`. Only
//! edges with `resolved_at = NULL` participate in scheduling; an edge is
//! resolved when its prerequisite completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a prerequisite relates to its dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Prerequisite must complete before the dependent starts
    Sequential,
    /// Prerequisite may run alongside siblings of the same dependent
    Parallel,
}

impl Default for DependencyType {
    fn default() -> Self {
        Self::Sequential
    }
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential" => Some(Self::Sequential),
            "parallel" => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// Directed edge from a dependent task to one of its prerequisites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub id: Uuid,
    pub dependent_task_id: Uuid,
    pub prerequisite_task_id: Uuid,
    pub dependency_type: DependencyType,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TaskDependency {
    pub fn new(dependent_task_id: Uuid, prerequisite_task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            dependent_task_id,
            prerequisite_task_id,
            dependency_type: DependencyType::default(),
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Whether this edge still gates scheduling.
    pub fn is_unresolved(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_edge_is_unresolved() {
        let edge = TaskDependency::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(edge.is_unresolved());
        assert_eq!(edge.dependency_type, DependencyType::Sequential);
    }

    #[test]
    fn test_dependency_type_round_trip() {
        assert_eq!(
            DependencyType::from_str("sequential"),
            Some(DependencyType::Sequential)
        );
        assert_eq!(
            DependencyType::from_str("parallel"),
            Some(DependencyType::Parallel)
        );
        assert_eq!(DependencyType::from_str("other"), None);
    }
}
