//! Command-line interface: command tree, output rendering, id resolution.

pub mod commands;
pub mod id_resolver;
pub mod output;

use clap::{Parser, Subcommand};

use commands::swarm::SwarmArgs;
use commands::task::TaskArgs;

/// Abathur: agentic swarm orchestrator with a persistent task queue.
#[derive(Parser, Debug)]
#[command(name = "abathur", version, about, propagate_version = true)]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the project workspace and database
    Init {
        /// Validate an existing workspace instead of creating one
        #[arg(long)]
        validate: bool,
        /// Database path override
        #[arg(long)]
        db_path: Option<String>,
        /// Skip workspace template materialization
        #[arg(long)]
        skip_template: bool,
    },
    /// Show overall queue and workspace status
    Status,
    /// Task queue operations
    Task(TaskArgs),
    /// Swarm worker pool operations
    Swarm(SwarmArgs),
}
