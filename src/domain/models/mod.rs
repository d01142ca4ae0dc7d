//! Domain models for the Abathur task queue.

pub mod agent;
pub mod dependency;
pub mod prune;
pub mod stats;
pub mod task;

pub use agent::{Agent, AgentState};
pub use dependency::{DependencyType, TaskDependency};
pub use prune::{
    PruneFilters, PruneResult, VacuumMode, AUTO_SKIP_VACUUM_THRESHOLD, VACUUM_THRESHOLD_TASKS,
};
pub use stats::QueueStats;
pub use task::{derive_summary, Task, TaskSource, TaskStatus, MAX_SUMMARY_LEN};
