// Flattened tree rows for display

use crate::filter::{Filter, Visibility};
use crate::task::Task;
use crate::tasks::TaskList;

/// One line of the rendered tree
#[derive(Debug, Clone, PartialEq)]
pub struct Row<'a> {
    pub task: &'a Task,
    /// 0 for roots
    pub depth: usize,
    /// Drives the expand/collapse affordance
    pub has_visible_children: bool,
    /// Progress badge; `None` for leaves
    pub completion: Option<u8>,
}

/// Depth-first, pre-order rows for every visible task
///
/// Children are only emitted under an expanded parent, so collapsing a task
/// hides its subtree even when something inside it matches the search.
/// Orphans are never reached.
pub fn render<'a>(list: &'a TaskList, filter: &Filter) -> Vec<Row<'a>> {
    let mut visibility = filter.visibility(list);
    let mut rows = Vec::new();
    for root in list.roots() {
        render_node(list, &mut visibility, root, 0, &mut rows);
    }
    rows
}

fn render_node<'a>(
    list: &'a TaskList,
    visibility: &mut Visibility<'_, 'a>,
    task: &'a Task,
    depth: usize,
    rows: &mut Vec<Row<'a>>,
) {
    if !visibility.is_visible(task) {
        return;
    }

    let visible_children: Vec<&'a Task> = visibility
        .children(&task.id)
        .into_iter()
        .filter(|&child| visibility.is_visible(child))
        .collect();

    rows.push(Row {
        task,
        depth,
        has_visible_children: !visible_children.is_empty(),
        completion: list.completion_in(visibility.index(), &task.id),
    });

    if task.expanded {
        for child in visible_children {
            render_node(list, visibility, child, depth + 1, rows);
        }
    }
}
