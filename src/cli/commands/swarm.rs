//! Swarm subcommands: start the worker pool, report its queue view.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::json;

use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::DomainResult;
use crate::domain::models::{QueueStats, TaskStatus};
use crate::domain::ports::{NullTaskExecutor, TaskExecutor};
use crate::services::{SwarmConfig, SwarmOrchestrator, SwarmRunReport, TaskQueueService};

#[derive(Args, Debug)]
pub struct SwarmArgs {
    #[command(subcommand)]
    pub command: SwarmCommands,
}

#[derive(Subcommand, Debug)]
pub enum SwarmCommands {
    /// Run the worker pool until the queue drains or ctrl-c
    Start {
        /// Stop after this many tasks have been spawned
        #[arg(long)]
        task_limit: Option<usize>,
        /// Maximum concurrent agents
        #[arg(long)]
        max_agents: Option<usize>,
        /// Poll interval in seconds when the queue is empty
        #[arg(long)]
        poll_interval: Option<u64>,
    },
    /// Show queue statistics
    Status,
}

struct RunReportOutput {
    report: SwarmRunReport,
}

impl CommandOutput for RunReportOutput {
    fn to_human(&self) -> String {
        let r = &self.report;
        let mut lines = vec![
            "Swarm run finished:".to_string(),
            format!("  spawned:   {}", r.tasks_spawned),
            format!("  succeeded: {}", r.tasks_succeeded),
            format!("  failed:    {}", r.tasks_failed),
        ];
        if r.tasks_cancelled_inflight > 0 {
            lines.push(format!("  cancelled in-flight: {}", r.tasks_cancelled_inflight));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "tasks_spawned": self.report.tasks_spawned,
            "tasks_succeeded": self.report.tasks_succeeded,
            "tasks_failed": self.report.tasks_failed,
            "tasks_cancelled_inflight": self.report.tasks_cancelled_inflight,
        })
    }
}

pub(crate) struct StatsOutput {
    pub stats: QueueStats,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let s = &self.stats;
        let mut lines = vec!["Queue status:".to_string()];
        for status in TaskStatus::all() {
            lines.push(format!("  {:<10} {}", format!("{status}:"), s.count(*status)));
        }
        lines.push(format!("  {:<10} {}", "total:", s.total_tasks));
        lines.push(format!("  avg priority: {:.2}", s.avg_priority));
        lines.push(format!("  max depth:    {}", s.max_depth));
        if let Some(oldest) = s.oldest_pending {
            lines.push(format!("  oldest pending: {}", oldest.to_rfc3339()));
        }
        if let Some(newest) = s.newest_task {
            lines.push(format!("  newest task:    {}", newest.to_rfc3339()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.stats).unwrap_or_default()
    }
}

pub async fn execute(
    service: Arc<TaskQueueService>,
    command: SwarmCommands,
    defaults: &crate::infrastructure::config::SwarmSettings,
    json_mode: bool,
) -> DomainResult<()> {
    match command {
        SwarmCommands::Start {
            task_limit,
            max_agents,
            poll_interval,
        } => {
            let config = SwarmConfig {
                max_concurrent_agents: max_agents.unwrap_or(defaults.max_agents),
                poll_interval: Duration::from_secs(
                    poll_interval.unwrap_or(defaults.poll_interval_secs),
                ),
                task_limit,
                shutdown_timeout: Duration::from_secs(defaults.shutdown_timeout_secs),
            };

            // The LLM backend plugs in behind the executor port; without one
            // configured, executions are acknowledged by the null executor.
            let executor: Arc<dyn TaskExecutor> = Arc::new(NullTaskExecutor);
            let orchestrator = Arc::new(SwarmOrchestrator::new(service, executor, config));

            let signal_handle = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("ctrl-c received, shutting down swarm");
                    signal_handle.shutdown();
                }
            });

            let report = orchestrator.run().await?;
            output(&RunReportOutput { report }, json_mode);
        }

        SwarmCommands::Status => {
            let stats = service.get_queue_status().await?;
            output(&StatsOutput { stats }, json_mode);
        }
    }

    Ok(())
}
