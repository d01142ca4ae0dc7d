//! Lineage tree rendering for `task list --tree`.
//!
//! Parent/child lineage only; dependency edges are not drawn here. Unicode
//! box-drawing by default with an ASCII fallback for terminals that need it.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::models::{Task, TaskStatus};

use super::truncate;

/// Glyph set for tree rendering.
#[derive(Debug, Clone, Copy)]
pub struct TreeGlyphs {
    branch: &'static str,
    last: &'static str,
    pipe: &'static str,
    space: &'static str,
}

impl TreeGlyphs {
    pub fn unicode() -> Self {
        Self {
            branch: "├── ",
            last: "└── ",
            pipe: "│   ",
            space: "    ",
        }
    }

    pub fn ascii() -> Self {
        Self {
            branch: "|-- ",
            last: "`-- ",
            pipe: "|   ",
            space: "    ",
        }
    }
}

fn status_glyph(status: TaskStatus, ascii: bool) -> &'static str {
    if ascii {
        return match status {
            TaskStatus::Pending => "[.]",
            TaskStatus::Blocked => "[b]",
            TaskStatus::Ready => "[r]",
            TaskStatus::Running => "[>]",
            TaskStatus::Completed => "[x]",
            TaskStatus::Failed => "[!]",
            TaskStatus::Cancelled => "[-]",
        };
    }
    match status {
        TaskStatus::Pending => "○",
        TaskStatus::Blocked => "◌",
        TaskStatus::Ready => "◍",
        TaskStatus::Running => "◉",
        TaskStatus::Completed => "●",
        TaskStatus::Failed => "✗",
        TaskStatus::Cancelled => "⊘",
    }
}

/// Render the lineage forest of the given tasks.
///
/// Roots are tasks with no parent (or whose parent is outside the set),
/// ordered by submission time.
pub fn render_lineage_tree(tasks: &[Task], ascii: bool) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }

    let glyphs = if ascii {
        TreeGlyphs::ascii()
    } else {
        TreeGlyphs::unicode()
    };

    let by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut children_of: HashMap<Uuid, Vec<&Task>> = HashMap::new();
    let mut roots: Vec<&Task> = Vec::new();

    for task in tasks {
        match task.parent_task_id.filter(|p| by_id.contains_key(p)) {
            Some(parent) => children_of.entry(parent).or_default().push(task),
            None => roots.push(task),
        }
    }
    roots.sort_by_key(|t| t.submitted_at);
    for children in children_of.values_mut() {
        children.sort_by_key(|t| t.submitted_at);
    }

    let mut out = String::new();
    for root in &roots {
        render_node(root, &children_of, &glyphs, ascii, 0, true, "", &mut out);
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn render_node(
    task: &Task,
    children_of: &HashMap<Uuid, Vec<&Task>>,
    glyphs: &TreeGlyphs,
    ascii: bool,
    depth: usize,
    is_last: bool,
    prefix: &str,
    out: &mut String,
) {
    let connector = if depth == 0 {
        ""
    } else if is_last {
        glyphs.last
    } else {
        glyphs.branch
    };

    out.push_str(&format!(
        "{prefix}{connector}{} {} [{}]\n",
        status_glyph(task.status, ascii),
        truncate(&task.summary, 60),
        &task.id.to_string()[..8],
    ));

    let Some(children) = children_of.get(&task.id) else {
        return;
    };

    let child_prefix = if depth == 0 {
        String::new()
    } else if is_last {
        format!("{prefix}{}", glyphs.space)
    } else {
        format!("{prefix}{}", glyphs.pipe)
    };

    for (i, child) in children.iter().enumerate() {
        let last_child = i == children.len() - 1;
        render_node(
            child,
            children_of,
            glyphs,
            ascii,
            depth + 1,
            last_child,
            &child_prefix,
            out,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_root() {
        let task = Task::new("root");
        let rendered = render_lineage_tree(std::slice::from_ref(&task), true);
        assert!(rendered.contains(&task.id.to_string()[..8]));
        assert!(rendered.starts_with("[.]"));
    }

    #[test]
    fn test_parent_child_nesting() {
        let parent = Task::new("parent");
        let mut child = Task::new("child").with_parent(parent.id);
        child.submitted_at = parent.submitted_at + chrono::Duration::seconds(1);

        let rendered = render_lineage_tree(&[parent.clone(), child.clone()], true);
        let parent_line = rendered
            .lines()
            .position(|l| l.contains(&parent.id.to_string()[..8]))
            .unwrap();
        let child_line = rendered
            .lines()
            .position(|l| l.contains(&child.id.to_string()[..8]))
            .unwrap();
        assert!(parent_line < child_line);
        assert!(rendered.lines().nth(child_line).unwrap().contains("`-- "));
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let orphan = Task::new("orphan").with_parent(Uuid::new_v4());
        let rendered = render_lineage_tree(&[orphan.clone()], false);
        assert!(rendered.contains(&orphan.id.to_string()[..8]));
        assert!(!rendered.contains("└── "));
    }
}
