// Status filter and text search over the task tree

use crate::error::Error;
use crate::task::Task;
use crate::tasks::{ChildIndex, TaskList};
use std::collections::HashMap;
use std::str::FromStr;

/// View filter: completion status plus a free-text query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub status: StatusFilter,
    /// Stored lowercased; empty means no search
    query: String,
}

/// Which completion states are shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl StatusFilter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Completed => task.completed,
            StatusFilter::Pending => !task.completed,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "completed" => Ok(StatusFilter::Completed),
            "pending" => Ok(StatusFilter::Pending),
            _ => Err(Error::InvalidStatusFilter(s.to_string())),
        }
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Completed => write!(f, "completed"),
            StatusFilter::Pending => write!(f, "pending"),
        }
    }
}

impl Filter {
    pub fn new(status: StatusFilter, query: &str) -> Self {
        Self {
            status,
            query: query.to_lowercase(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Case-insensitive substring match over text, subject and tag
    pub fn matches_query(&self, task: &Task) -> bool {
        self.query.is_empty() || task.search_haystack().contains(&self.query)
    }

    /// Whether `task` should be drawn under this filter
    ///
    /// Status is checked on the node alone. A node that misses the query is
    /// still shown when one of its children is visible, which recursively
    /// lets a buried match keep its whole ancestor chain on screen.
    pub fn is_visible(&self, list: &TaskList, task: &Task) -> bool {
        Visibility::new(self, list).evaluate(task)
    }

    /// Memoized visibility for asking about many tasks of the same list
    pub fn visibility<'f, 'a>(&'f self, list: &'a TaskList) -> Visibility<'f, 'a> {
        Visibility::new(self, list)
    }
}

/// [`Filter::is_visible`] over one [`TaskList`], remembering every verdict
///
/// The parent -> children index is built once, so checking every task of a
/// tree visits each task a single time.
pub struct Visibility<'f, 'a> {
    filter: &'f Filter,
    list: &'a TaskList,
    index: ChildIndex<'a>,
    memo: HashMap<&'a str, bool>,
}

impl<'f, 'a> Visibility<'f, 'a> {
    pub fn new(filter: &'f Filter, list: &'a TaskList) -> Self {
        Self {
            filter,
            list,
            index: list.child_index(),
            memo: HashMap::new(),
        }
    }

    pub fn is_visible(&mut self, task: &'a Task) -> bool {
        if let Some(&visible) = self.memo.get(task.id.as_str()) {
            return visible;
        }

        // A task met again while its own verdict is pending sits on a cycle
        self.memo.insert(task.id.as_str(), false);
        let visible = self.evaluate(task);
        self.memo.insert(task.id.as_str(), visible);
        visible
    }

    /// Direct children of `parent_id`, in store order
    pub fn children(&self, parent_id: &str) -> Vec<&'a Task> {
        self.list.children_in(&self.index, parent_id)
    }

    pub(crate) fn index(&self) -> &ChildIndex<'a> {
        &self.index
    }

    fn evaluate(&mut self, task: &Task) -> bool {
        if !self.filter.status.matches(task) {
            return false;
        }

        if self.filter.matches_query(task) {
            return true;
        }

        self.children(&task.id)
            .into_iter()
            .any(|child| self.is_visible(child))
    }
}
