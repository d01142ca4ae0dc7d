//! Abathur - agentic swarm orchestrator.
//!
//! A persistent, dependency-aware, priority-scheduled task queue with a
//! bounded worker pool:
//! - SQLite store (WAL mode) as the single source of truth
//! - Dependency resolver with cycle detection and topological ordering
//! - Composite priority scoring (base, deadline, depth, source)
//! - Atomic queue transitions with cascading failure/cancellation
//! - Swarm orchestrator driving an executor port

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Task, TaskSource, TaskStatus};
