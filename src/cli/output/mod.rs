//! CLI output rendering.

pub mod table;
pub mod tree;

pub use table::{format_children_table, format_task_table};
pub use tree::{render_lineage_tree, TreeGlyphs};

use console::style;

/// Anything a command can print, human or JSON.
pub trait CommandOutput {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

/// Print a command's output in the selected mode.
pub fn output<T: CommandOutput>(value: &T, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&value.to_json()).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!("{}", value.to_human());
    }
}

/// Render a single-line error with a red prefix and an optional hint.
pub fn render_error(error: &crate::domain::errors::DomainError) -> String {
    let hint = error_hint(error);
    let line = format!("{} {error}", style("error:").red().bold());
    match hint {
        Some(hint) => format!("{line}\n  {} {hint}", style("hint:").yellow()),
        None => line,
    }
}

fn error_hint(error: &crate::domain::errors::DomainError) -> Option<&'static str> {
    use crate::domain::errors::DomainError;
    match error {
        DomainError::PrefixNotFound(_) => Some("run 'abathur task list' to see known task ids"),
        DomainError::AmbiguousPrefix { .. } => Some("use more characters of the id"),
        DomainError::DependencyCycle { .. } | DomainError::SelfDependency(_) => {
            Some("remove one of the dependencies to break the cycle")
        }
        DomainError::StorageBusy(_) => Some("another process holds the database lock; retry"),
        _ => None,
    }
}

/// Truncate a string to `max` characters with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
