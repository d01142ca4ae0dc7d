//! Table rendering for task listings using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{Task, TaskStatus};

use super::truncate;

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_cell(status: TaskStatus) -> Cell {
    Cell::new(status.as_str()).fg(status_color(status))
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Pending => Color::Grey,
        TaskStatus::Blocked => Color::Yellow,
        TaskStatus::Ready => Color::Cyan,
        TaskStatus::Running => Color::Blue,
        TaskStatus::Completed => Color::Green,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Cancelled => Color::DarkGrey,
    }
}

/// Format a task listing.
pub fn format_task_table(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }

    let mut table = base_table();
    table.set_header(vec![
        Cell::new("ID").add_attribute(Attribute::Bold),
        Cell::new("Summary").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Priority").add_attribute(Attribute::Bold),
        Cell::new("Agent").add_attribute(Attribute::Bold),
        Cell::new("Submitted").add_attribute(Attribute::Bold),
    ]);

    for task in tasks {
        table.add_row(vec![
            Cell::new(&task.id.to_string()[..8]),
            Cell::new(truncate(&task.summary, 48)),
            status_cell(task.status),
            Cell::new(format!("{:.2}", task.calculated_priority)),
            Cell::new(&task.agent_type),
            Cell::new(task.submitted_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    table.to_string()
}

/// Format the direct-children table shown under `task show`.
pub fn format_children_table(children: &[Task]) -> String {
    if children.is_empty() {
        return String::new();
    }

    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Child ID").add_attribute(Attribute::Bold),
        Cell::new("Summary").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
    ]);

    for child in children {
        table.add_row(vec![
            Cell::new(&child.id.to_string()[..8]),
            Cell::new(truncate(&child.summary, 56)),
            status_cell(child.status),
        ]);
    }

    format!("\nChildren ({}):\n{table}", children.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_listing() {
        assert_eq!(format_task_table(&[]), "No tasks found.");
        assert_eq!(format_children_table(&[]), "");
    }

    #[test]
    fn test_table_contains_short_id_and_summary() {
        let task = Task::new("render me");
        let rendered = format_task_table(&[task.clone()]);
        assert!(rendered.contains(&task.id.to_string()[..8]));
        assert!(rendered.contains("User Prompt: render me"));
    }
}
