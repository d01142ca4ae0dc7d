//! Composite task priority scoring.
//!
//! `score = base_priority + deadline_urgency + depth_boost + source_weight`.
//! The function is pure: it reads only the task's fields and the supplied
//! dependency depth, so recomputation is idempotent.

use chrono::Utc;

use crate::domain::models::{Task, TaskSource};

/// Boost per level of dependency depth.
pub const DEPTH_WEIGHT: f64 = 0.5;
/// Cap on the depth boost.
pub const DEPTH_BOOST_MAX: f64 = 3.0;
/// Maximum deadline urgency boost; tasks past their deadline get all of it.
pub const DEADLINE_BOOST_MAX: f64 = 5.0;

/// Service for calculating dynamic task priorities.
#[derive(Debug, Clone)]
pub struct PriorityCalculator {
    depth_weight: f64,
    depth_boost_max: f64,
    deadline_boost_max: f64,
}

impl Default for PriorityCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityCalculator {
    /// Create a calculator with the default weights.
    pub fn new() -> Self {
        Self {
            depth_weight: DEPTH_WEIGHT,
            depth_boost_max: DEPTH_BOOST_MAX,
            deadline_boost_max: DEADLINE_BOOST_MAX,
        }
    }

    /// Create a calculator with custom weights.
    pub fn with_weights(depth_weight: f64, depth_boost_max: f64, deadline_boost_max: f64) -> Self {
        Self {
            depth_weight,
            depth_boost_max,
            deadline_boost_max,
        }
    }

    /// Calculate the composite priority for a task at the given depth.
    pub fn calculate(&self, task: &Task, dependency_depth: u32) -> f64 {
        let base = f64::from(task.base_priority);
        let depth_boost = (f64::from(dependency_depth) * self.depth_weight).min(self.depth_boost_max);
        let deadline_boost = self.deadline_boost(task);
        let source_weight = Self::source_weight(task.source);

        base + depth_boost + deadline_boost + source_weight
    }

    /// Write the computed priority and depth back onto the task value.
    pub fn update_task_priority(&self, task: &mut Task, dependency_depth: u32) {
        task.calculated_priority = self.calculate(task, dependency_depth);
        task.dependency_depth = dependency_depth;
    }

    /// Fixed per-source weights; human submissions outrank agent-spawned work.
    pub fn source_weight(source: TaskSource) -> f64 {
        match source {
            TaskSource::Human => 2.0,
            TaskSource::AgentRequirements => 1.0,
            TaskSource::AgentPlanner => 0.75,
            TaskSource::AgentImplementation => 0.5,
        }
    }

    /// Deadline urgency grows with the elapsed share of the
    /// submitted-to-deadline window, clamped to `[0, deadline_boost_max]`.
    fn deadline_boost(&self, task: &Task) -> f64 {
        let Some(deadline) = task.deadline else {
            return 0.0;
        };
        let now = Utc::now();

        if deadline <= now {
            return self.deadline_boost_max;
        }

        let total = deadline - task.submitted_at;
        if total.num_seconds() <= 0 {
            return 0.0;
        }
        let remaining = deadline - now;

        let ratio = 1.0 - (remaining.num_seconds() as f64 / total.num_seconds() as f64);
        ratio.clamp(0.0, 1.0) * self.deadline_boost_max
    }
}
