//! Service layer: resolver, priority scoring, queue operations, swarm pool.

pub mod dependency_resolver;
pub mod priority_calculator;
pub mod swarm_orchestrator;
pub mod task_queue_service;

pub use dependency_resolver::DependencyResolver;
pub use priority_calculator::PriorityCalculator;
pub use swarm_orchestrator::{SwarmConfig, SwarmOrchestrator, SwarmRunReport};
pub use task_queue_service::{EnqueueTask, TaskQueueService, TaskUpdate};
