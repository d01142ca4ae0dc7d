//! Task subcommands: submit, list, show, update, prune, retry, cancel,
//! check-stale.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::cli::id_resolver::resolve_task_id;
use crate::cli::output::{
    format_children_table, format_task_table, output, render_lineage_tree, CommandOutput,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{PruneFilters, PruneResult, Task, TaskSource, TaskStatus, VacuumMode};
use crate::domain::ports::TaskFilters;
use crate::services::{EnqueueTask, TaskQueueService, TaskUpdate};

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Submit a new task
    Submit {
        /// The prompt for the executing agent
        prompt: String,
        /// Agent specialization
        #[arg(long, default_value = "requirements-gatherer")]
        agent_type: String,
        /// Short human label (auto-derived when omitted)
        #[arg(long)]
        summary: Option<String>,
        /// Base priority, 0-10
        #[arg(long, default_value_t = 5)]
        priority: u8,
        /// Prerequisite task ids or prefixes
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        /// Lineage parent id or prefix
        #[arg(long)]
        parent: Option<String>,
        /// Deadline (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<String>,
        /// Read input payload JSON from a file
        #[arg(long, conflicts_with = "input_json")]
        input_file: Option<String>,
        /// Inline input payload JSON
        #[arg(long)]
        input_json: Option<String>,
    },
    /// List tasks
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Exclude a status
        #[arg(long)]
        exclude_status: Option<String>,
        /// Maximum number of results
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Render parent/child lineage as a tree
        #[arg(long, alias = "lineage")]
        tree: bool,
        /// Force Unicode box-drawing glyphs (default)
        #[arg(long, conflicts_with = "ascii")]
        unicode: bool,
        /// Force ASCII tree glyphs
        #[arg(long)]
        ascii: bool,
    },
    /// Show one task with its direct children
    Show {
        /// Task id or unique prefix
        id: String,
    },
    /// Update task fields
    Update {
        /// Task id or unique prefix
        id: String,
        /// New status
        #[arg(long)]
        status: Option<String>,
        /// New base priority, 0-10
        #[arg(long)]
        priority: Option<u8>,
        /// New agent type
        #[arg(long)]
        agent_type: Option<String>,
        /// Preview the change without applying it
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete tasks by id, status, or age
    Prune {
        /// Task ids or prefixes to delete
        ids: Vec<String>,
        /// Delete all tasks with this status
        #[arg(long)]
        status: Option<String>,
        /// Delete tasks older than a duration (e.g. 30d, 2w, 6m, 1y)
        #[arg(long)]
        older_than: Option<String>,
        /// Delete tasks completed/submitted before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<String>,
        /// Maximum tasks to delete
        #[arg(long)]
        limit: Option<u32>,
        /// Delete without a preview pass
        #[arg(long)]
        force: bool,
        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
        /// VACUUM strategy: always, conditional, or never
        #[arg(long, default_value = "conditional")]
        vacuum: String,
        /// Delete whole descendant trees, leaves first
        #[arg(short, long)]
        recursive: bool,
        /// Maximum tree depth shown in recursive previews
        #[arg(long, default_value_t = 5)]
        preview_depth: u32,
    },
    /// Retry a failed or cancelled task
    Retry {
        /// Task id or unique prefix
        id: String,
    },
    /// Cancel a task and its dependents
    Cancel {
        /// Task id or unique prefix
        id: String,
        /// Cancel even if the task is currently running
        #[arg(long)]
        force: bool,
    },
    /// Fail RUNNING tasks whose execution timeout has lapsed
    CheckStale,
}

/// Parse `<integer><d|w|m|y>` into days. `m` is 30 days, `y` 365, `w` 7.
pub fn parse_older_than(input: &str) -> Result<u32, String> {
    let input = input.trim();
    if input.len() < 2 {
        return Err(format!(
            "Invalid duration '{input}': use <number><unit> like 30d, 2w, 6m, 1y"
        ));
    }

    let (number, unit) = input.split_at(input.len() - 1);
    let value: u32 = number
        .parse()
        .map_err(|_| format!("Invalid duration '{input}': '{number}' is not a number"))?;
    if value == 0 {
        return Err(format!("Invalid duration '{input}': must be at least 1"));
    }

    match unit {
        "d" => Ok(value),
        "w" => Ok(value * 7),
        "m" => Ok(value * 30),
        "y" => Ok(value * 365),
        other => Err(format!(
            "Invalid duration unit '{other}': use d (days), w (weeks), m (months), y (years)"
        )),
    }
}

fn parse_status(input: &str) -> DomainResult<TaskStatus> {
    TaskStatus::from_str(input).ok_or_else(|| {
        let valid: Vec<&str> = TaskStatus::all().iter().map(TaskStatus::as_str).collect();
        DomainError::Validation(format!(
            "Unknown status '{input}'. Valid values: {}",
            valid.join(", ")
        ))
    })
}

fn parse_date(input: &str) -> DomainResult<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(input) {
        return Ok(stamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(|date| {
            date.and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .and_utc()
        })
        .map_err(|_| {
            DomainError::Validation(format!(
                "Invalid date '{input}': use YYYY-MM-DD or an RFC 3339 timestamp"
            ))
        })
}

struct SubmitOutput {
    task: Task,
}

impl CommandOutput for SubmitOutput {
    fn to_human(&self) -> String {
        format!("{}", self.task.id)
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.task.id,
            "status": self.task.status.as_str(),
            "summary": &self.task.summary,
            "calculated_priority": self.task.calculated_priority,
        })
    }
}

struct ListOutput {
    tasks: Vec<Task>,
    tree: bool,
    ascii: bool,
}

impl CommandOutput for ListOutput {
    fn to_human(&self) -> String {
        if self.tree {
            render_lineage_tree(&self.tasks, self.ascii)
        } else {
            format_task_table(&self.tasks)
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "total": self.tasks.len(),
            "tasks": &self.tasks,
        })
    }
}

struct ShowOutput {
    task: Task,
    children: Vec<Task>,
}

impl CommandOutput for ShowOutput {
    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![
            format!("Task:     {}", task.id),
            format!("Summary:  {}", task.summary),
            format!("Status:   {}", task.status),
            format!("Source:   {}", task.source),
            format!("Agent:    {}", task.agent_type),
            format!(
                "Priority: {} (calculated {:.2}, depth {})",
                task.base_priority, task.calculated_priority, task.dependency_depth
            ),
            format!("Retries:  {}/{}", task.retry_count, task.max_retries),
            format!("Submitted: {}", task.submitted_at.to_rfc3339()),
        ];
        if let Some(parent) = task.parent_task_id {
            lines.push(format!("Parent:   {parent}"));
        }
        if let Some(deadline) = task.deadline {
            lines.push(format!("Deadline: {}", deadline.to_rfc3339()));
        }
        if let Some(started) = task.started_at {
            lines.push(format!("Started:  {}", started.to_rfc3339()));
        }
        if let Some(completed) = task.completed_at {
            lines.push(format!("Finished: {}", completed.to_rfc3339()));
        }
        if let Some(branch) = &task.feature_branch {
            lines.push(format!("Feature branch: {branch}"));
        }
        if let Some(worktree) = &task.worktree_path {
            lines.push(format!("Worktree: {worktree}"));
        }
        if let Some(error) = &task.error_message {
            lines.push(format!("Error:    {error}"));
        }
        lines.push(format!("\nPrompt:\n{}", task.prompt));
        lines.push(format_children_table(&self.children));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "task": &self.task,
            "children": &self.children,
        })
    }
}

struct MessageOutput {
    message: String,
    payload: serde_json::Value,
}

impl CommandOutput for MessageOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        self.payload.clone()
    }
}

struct PruneOutput {
    result: PruneResult,
    preview_tree: Option<String>,
}

impl CommandOutput for PruneOutput {
    fn to_human(&self) -> String {
        let r = &self.result;
        let mut lines = Vec::new();
        if let Some(tree) = &self.preview_tree {
            lines.push(tree.clone());
        }
        let verb = if r.dry_run { "Would delete" } else { "Deleted" };
        lines.push(format!(
            "{verb} {} task(s) and {} dependency edge(s)",
            r.deleted_tasks, r.deleted_dependencies
        ));
        if !r.breakdown_by_status.is_empty() {
            let mut parts: Vec<String> = r
                .breakdown_by_status
                .iter()
                .map(|(status, count)| format!("{status}: {count}"))
                .collect();
            parts.sort();
            lines.push(format!("  by status: {}", parts.join(", ")));
        }
        if !r.skipped_parents.is_empty() {
            lines.push(format!(
                "Refused {} task(s) with live children outside the selection:",
                r.skipped_parents.len()
            ));
            for id in &r.skipped_parents {
                lines.push(format!("  {id}"));
            }
        }
        if let Some(bytes) = r.reclaimed_bytes {
            lines.push(format!("Reclaimed {bytes} bytes"));
        }
        if r.vacuum_auto_skipped {
            lines.push("VACUUM auto-skipped for large prune".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.result).unwrap_or_default()
    }
}

pub async fn execute(
    service: &TaskQueueService,
    command: TaskCommands,
    json_mode: bool,
) -> DomainResult<()> {
    match command {
        TaskCommands::Submit {
            prompt,
            agent_type,
            summary,
            priority,
            depends_on,
            parent,
            deadline,
            input_file,
            input_json,
        } => {
            let mut prerequisites = Vec::with_capacity(depends_on.len());
            for dep in &depends_on {
                prerequisites.push(resolve_task_id(service, dep).await?);
            }
            let parent_id = match parent {
                Some(p) => Some(resolve_task_id(service, &p).await?),
                None => None,
            };
            let deadline = deadline.as_deref().map(parse_date).transpose()?;

            let input_data = match (input_file, input_json) {
                (Some(path), _) => {
                    let text = std::fs::read_to_string(&path).map_err(|e| {
                        DomainError::Validation(format!("Cannot read input file '{path}': {e}"))
                    })?;
                    Some(serde_json::from_str(&text).map_err(|e| {
                        DomainError::Validation(format!("Input file '{path}' is not JSON: {e}"))
                    })?)
                }
                (None, Some(inline)) => Some(serde_json::from_str(&inline).map_err(|e| {
                    DomainError::Validation(format!("--input-json is not valid JSON: {e}"))
                })?),
                (None, None) => None,
            };

            let mut request = EnqueueTask::new(prompt, TaskSource::Human)
                .with_prerequisites(prerequisites)
                .with_priority(priority)
                .with_agent_type(agent_type);
            request.summary = summary;
            request.parent_task_id = parent_id;
            request.deadline = deadline;
            request.input_data = input_data;

            let task = service.enqueue_task(request).await?;
            output(&SubmitOutput { task }, json_mode);
        }

        TaskCommands::List {
            status,
            exclude_status,
            limit,
            tree,
            unicode: _,
            ascii,
        } => {
            let filters = TaskFilters {
                status: status.as_deref().map(parse_status).transpose()?,
                exclude_status: exclude_status.as_deref().map(parse_status).transpose()?,
                limit: Some(limit),
                ..TaskFilters::default()
            };
            let tasks = service.list_tasks(&filters).await?;
            output(&ListOutput { tasks, tree, ascii }, json_mode);
        }

        TaskCommands::Show { id } => {
            let task_id = resolve_task_id(service, &id).await?;
            let task = service
                .get_task(task_id)
                .await?
                .ok_or(DomainError::TaskNotFound(task_id))?;
            let children = service.get_child_tasks(&[task_id]).await?;
            output(&ShowOutput { task, children }, json_mode);
        }

        TaskCommands::Update {
            id,
            status,
            priority,
            agent_type,
            dry_run,
        } => {
            let task_id = resolve_task_id(service, &id).await?;
            let update = TaskUpdate {
                status: status.as_deref().map(parse_status).transpose()?,
                base_priority: priority,
                agent_type,
            };

            if dry_run {
                let current = service
                    .get_task(task_id)
                    .await?
                    .ok_or(DomainError::TaskNotFound(task_id))?;
                let mut changes = Vec::new();
                if let Some(status) = update.status {
                    changes.push(format!("status: {} -> {status}", current.status));
                }
                if let Some(priority) = update.base_priority {
                    changes.push(format!(
                        "priority: {} -> {priority}",
                        current.base_priority
                    ));
                }
                if let Some(agent_type) = &update.agent_type {
                    changes.push(format!("agent_type: {} -> {agent_type}", current.agent_type));
                }
                let message = if changes.is_empty() {
                    format!("Dry run: no changes for {task_id}")
                } else {
                    format!("Dry run for {task_id}:\n  {}", changes.join("\n  "))
                };
                output(
                    &MessageOutput {
                        payload: json!({ "dry_run": true, "task_id": task_id }),
                        message,
                    },
                    json_mode,
                );
                return Ok(());
            }

            let task = service.update_task(task_id, update).await?;
            output(
                &MessageOutput {
                    message: format!(
                        "Updated {task_id}: status {}, priority {}, agent {}",
                        task.status, task.base_priority, task.agent_type
                    ),
                    payload: serde_json::to_value(&task).unwrap_or_default(),
                },
                json_mode,
            );
        }

        TaskCommands::Prune {
            ids,
            status,
            older_than,
            before,
            limit,
            force,
            dry_run,
            vacuum,
            recursive,
            preview_depth,
        } => {
            let filter_methods = [
                !ids.is_empty(),
                older_than.is_some() || before.is_some(),
                status.is_some(),
            ]
            .iter()
            .filter(|&&used| used)
            .count();

            if filter_methods == 0 {
                return Err(DomainError::Validation(
                    "Specify a filter: task ids, --older-than/--before, or --status".to_string(),
                ));
            }
            if filter_methods > 1 {
                return Err(DomainError::Validation(
                    "Filter methods are mutually exclusive: use task ids, time filters, \
                     or --status, not a combination"
                        .to_string(),
                ));
            }
            if recursive && limit.is_some() {
                return Err(DomainError::Validation(
                    "--recursive cannot be combined with --limit".to_string(),
                ));
            }

            let vacuum_mode = VacuumMode::from_str(&vacuum).ok_or_else(|| {
                DomainError::Validation(format!(
                    "Invalid vacuum mode '{vacuum}': use always, conditional, or never"
                ))
            })?;

            let mut task_ids = None;
            if !ids.is_empty() {
                let mut resolved = Vec::with_capacity(ids.len());
                for id in &ids {
                    resolved.push(resolve_task_id(service, id).await?);
                }
                task_ids = Some(resolved);
            }

            let filters = PruneFilters {
                task_ids: task_ids.clone(),
                older_than_days: older_than.as_deref().map(parse_older_than).transpose()
                    .map_err(DomainError::Validation)?,
                before_date: before.as_deref().map(parse_date).transpose()?,
                statuses: status
                    .as_deref()
                    .map(parse_status)
                    .transpose()?
                    .map(|s| vec![s]),
                limit,
                dry_run,
                vacuum_mode,
                recursive,
            };

            // Without --force, a destructive call runs as a preview first
            // and asks for --force instead of prompting interactively.
            let effective = if !dry_run && !force {
                PruneFilters {
                    dry_run: true,
                    ..filters
                }
            } else {
                filters
            };
            let preview_only = effective.dry_run && !dry_run;

            let result = service.prune_tasks(&effective).await?;

            let preview_tree = if recursive && effective.dry_run {
                match &task_ids {
                    Some(roots) => {
                        Some(render_subtree_preview(service, roots, preview_depth).await?)
                    }
                    None => None,
                }
            } else {
                None
            };

            output(
                &PruneOutput {
                    result,
                    preview_tree,
                },
                json_mode,
            );
            if preview_only {
                println!("Re-run with --force to delete.");
            }
        }

        TaskCommands::Retry { id } => {
            let task_id = resolve_task_id(service, &id).await?;
            let task = service.retry_task(task_id).await?;
            output(
                &MessageOutput {
                    message: format!(
                        "Retried {task_id}: status {}, attempt {}/{}",
                        task.status, task.retry_count, task.max_retries
                    ),
                    payload: serde_json::to_value(&task).unwrap_or_default(),
                },
                json_mode,
            );
        }

        TaskCommands::Cancel { id, force } => {
            let task_id = resolve_task_id(service, &id).await?;
            if !force {
                let task = service
                    .get_task(task_id)
                    .await?
                    .ok_or(DomainError::TaskNotFound(task_id))?;
                if task.status == TaskStatus::Running {
                    return Err(DomainError::Conflict(format!(
                        "Task {task_id} is running; use --force to cancel it anyway"
                    )));
                }
            }
            let cancelled = service.cancel_task(task_id).await?;
            output(
                &MessageOutput {
                    message: format!("Cancelled {} task(s)", cancelled.len()),
                    payload: json!({ "cancelled": cancelled }),
                },
                json_mode,
            );
        }

        TaskCommands::CheckStale => {
            let handled = service.handle_stale_tasks().await?;
            let message = if handled.is_empty() {
                "No stale running tasks.".to_string()
            } else {
                let mut lines = vec![format!("Failed {} stale task(s):", handled.len())];
                for (task_id, cancelled) in &handled {
                    lines.push(format!(
                        "  {task_id} (cancelled {} dependent(s))",
                        cancelled.len()
                    ));
                }
                lines.join("\n")
            };
            let payload = json!({
                "stale": handled
                    .iter()
                    .map(|(id, cancelled)| json!({ "task_id": id, "cancelled": cancelled }))
                    .collect::<Vec<_>>(),
            });
            output(&MessageOutput { message, payload }, json_mode);
        }
    }

    Ok(())
}

/// BFS the lineage of the given roots down to `max_depth` levels and render
/// it as a tree, marking truncation.
async fn render_subtree_preview(
    service: &TaskQueueService,
    roots: &[Uuid],
    max_depth: u32,
) -> DomainResult<String> {
    let mut tasks: Vec<Task> = service.list_tasks(&TaskFilters::default()).await?;
    tasks.retain(|t| roots.contains(&t.id));

    let mut frontier: Vec<Uuid> = roots.to_vec();
    let mut truncated = false;
    for depth in 0..=max_depth {
        if frontier.is_empty() {
            break;
        }
        let children = service.get_child_tasks(&frontier).await?;
        if depth == max_depth {
            truncated = !children.is_empty();
            break;
        }
        frontier = children.iter().map(|t| t.id).collect();
        let known: HashMap<Uuid, ()> = tasks.iter().map(|t| (t.id, ())).collect();
        tasks.extend(
            children
                .into_iter()
                .filter(|c| !known.contains_key(&c.id)),
        );
    }

    let mut rendered = render_lineage_tree(&tasks, false);
    if truncated {
        rendered.push_str("    ... (deeper levels not shown)\n");
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_older_than_units() {
        assert_eq!(parse_older_than("30d").unwrap(), 30);
        assert_eq!(parse_older_than("30w").unwrap(), 210);
        assert_eq!(parse_older_than("6m").unwrap(), 180);
        assert_eq!(parse_older_than("1y").unwrap(), 365);
    }

    #[test]
    fn test_parse_older_than_rejects_malformed() {
        assert!(parse_older_than("30").is_err());
        assert!(parse_older_than("d").is_err());
        assert!(parse_older_than("30x").is_err());
        assert!(parse_older_than("-5d").is_err());
        assert!(parse_older_than("0d").is_err());
        assert!(parse_older_than("").is_err());
    }

    #[test]
    fn test_parse_status_lists_valid_set_on_error() {
        let err = parse_status("bogus").unwrap_err();
        let message = err.to_string();
        for status in TaskStatus::all() {
            assert!(message.contains(status.as_str()));
        }
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2025-01-01").is_ok());
        assert!(parse_date("2025-01-01T12:30:00Z").is_ok());
        assert!(parse_date("January 1st").is_err());
    }
}
