// In-memory task arena: CRUD, cascades and tree queries

use crate::date;
use crate::id::generate_id;
use crate::task::{NewTask, Stats, Task};
use chrono::Utc;
use serde_json::Map;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Parent id -> positions of its children in the arena, in store order
pub(crate) type ChildIndex<'a> = HashMap<&'a str, Vec<usize>>;

/// Flat, ordered collection of tasks
///
/// Parent/child links are resolved by id lookups at query time. Store order
/// is insertion order and is what every query iterates in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a task from user input
    ///
    /// Returns `None` without touching the list when the trimmed text is
    /// empty or `parent_id` names a task that does not exist.
    pub fn add_task(&mut self, fields: NewTask, parent_id: Option<&str>) -> Option<Task> {
        let text = fields.text.trim();
        if text.is_empty() {
            debug!("add_task: blank text, skipping");
            return None;
        }

        if let Some(parent_id) = parent_id
            && self.find(parent_id).is_none()
        {
            debug!(parent_id, "add_task: parent not found, skipping");
            return None;
        }

        let task = Task {
            id: generate_id(),
            parent_id: parent_id.map(str::to_string),
            text: text.to_string(),
            date: date::parse_input_date(&fields.date, date::today()),
            subject: fields.subject.trim().to_string(),
            tag: fields.tag.trim().to_string(),
            priority: fields.priority,
            completed: false,
            expanded: true,
            created_at: Utc::now(),
            extra: Map::new(),
        };

        debug!(id = %task.id, parent_id = ?task.parent_id, "add_task: created");
        self.tasks.push(task.clone());
        Some(task)
    }

    /// Create a child of `parent_id` that inherits date, subject and priority
    ///
    /// The parent is expanded so the new child is on screen.
    pub fn add_subtask(&mut self, parent_id: &str, text: &str) -> Option<Task> {
        let text = text.trim();
        if text.is_empty() {
            debug!(parent_id, "add_subtask: blank text, skipping");
            return None;
        }

        let parent_idx = self.position(parent_id)?;
        let parent = &mut self.tasks[parent_idx];
        parent.expanded = true;

        let task = Task {
            id: generate_id(),
            parent_id: Some(parent.id.clone()),
            text: text.to_string(),
            date: parent.date,
            subject: parent.subject.clone(),
            tag: String::new(),
            priority: parent.priority,
            completed: false,
            expanded: true,
            created_at: Utc::now(),
            extra: Map::new(),
        };

        debug!(id = %task.id, parent_id, "add_subtask: created");
        self.tasks.push(task.clone());
        Some(task)
    }

    /// Remove a task and its whole subtree
    ///
    /// Returns the number of tasks removed; 0 when `id` is unknown.
    pub fn delete_task(&mut self, id: &str) -> usize {
        if self.position(id).is_none() {
            return 0;
        }

        let mut doomed: HashSet<String> = self.descendants(id).into_iter().map(|t| t.id.clone()).collect();
        doomed.insert(id.to_string());

        let before = self.tasks.len();
        self.tasks.retain(|t| !doomed.contains(&t.id));
        let removed = before - self.tasks.len();

        debug!(id, removed, "delete_task: removed subtree");
        removed
    }

    /// Flip completion on `id` and copy the new value to every descendant
    ///
    /// Returns the new value, or `None` when `id` is unknown.
    pub fn toggle_completion(&mut self, id: &str) -> Option<bool> {
        let idx = self.position(id)?;
        let completed = !self.tasks[idx].completed;
        self.tasks[idx].completed = completed;

        let affected: HashSet<String> = self.descendants(id).into_iter().map(|t| t.id.clone()).collect();
        for task in self.tasks.iter_mut().filter(|t| affected.contains(&t.id)) {
            task.completed = completed;
        }

        debug!(id, completed, cascaded = affected.len(), "toggle_completion");
        Some(completed)
    }

    /// Flip `expanded` on exactly this task
    pub fn toggle_expanded(&mut self, id: &str) -> Option<bool> {
        let idx = self.position(id)?;
        let task = &mut self.tasks[idx];
        task.expanded = !task.expanded;
        Some(task.expanded)
    }

    /// Replace the text of `id`; blank text counts as a cancelled edit
    pub fn edit_text(&mut self, id: &str, new_text: &str) -> bool {
        let new_text = new_text.trim();
        if new_text.is_empty() {
            return false;
        }

        match self.position(id) {
            Some(idx) => {
                self.tasks[idx].text = new_text.to_string();
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Direct children of `parent_id`, in store order
    pub fn children(&self, parent_id: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .collect()
    }

    /// Tasks without a parent, in store order
    ///
    /// Orphans (a `parent_id` that matches nothing) are not roots.
    pub fn roots(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.is_root()).collect()
    }

    /// Every task below `id`, depth-first pre-order
    ///
    /// Each task appears at most once, even if stored links form a cycle.
    pub fn descendants(&self, id: &str) -> Vec<&Task> {
        self.descendants_in(&self.child_index(), id)
    }

    pub(crate) fn descendants_in<'a>(&'a self, index: &ChildIndex<'a>, id: &str) -> Vec<&'a Task> {
        let mut seen: HashSet<&str> = HashSet::new();
        if let Some(task) = self.find(id) {
            seen.insert(task.id.as_str());
        }

        let mut out = Vec::new();
        self.collect_descendants(index, id, &mut seen, &mut out);
        out
    }

    fn collect_descendants<'a>(
        &'a self,
        index: &ChildIndex<'a>,
        id: &str,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<&'a Task>,
    ) {
        let Some(children) = index.get(id) else {
            return;
        };

        for &idx in children {
            let child = &self.tasks[idx];
            if !seen.insert(child.id.as_str()) {
                continue;
            }
            out.push(child);
            self.collect_descendants(index, &child.id, seen, out);
        }
    }

    /// Parent id -> indexes of its children, in store order
    pub(crate) fn child_index(&self) -> ChildIndex<'_> {
        let mut index: ChildIndex<'_> = HashMap::new();
        for (idx, task) in self.tasks.iter().enumerate() {
            if let Some(parent_id) = task.parent_id.as_deref() {
                index.entry(parent_id).or_default().push(idx);
            }
        }
        index
    }

    /// Same as [`TaskList::children`], through a prebuilt index
    pub(crate) fn children_in<'a>(&'a self, index: &ChildIndex<'a>, parent_id: &str) -> Vec<&'a Task> {
        index
            .get(parent_id)
            .map(|children| children.iter().map(|&idx| &self.tasks[idx]).collect())
            .unwrap_or_default()
    }

    /// Share of completed descendants, rounded half-up to a whole percent
    ///
    /// `None` when the task has no descendants (or does not exist).
    pub fn completion_percentage(&self, id: &str) -> Option<u8> {
        self.completion_in(&self.child_index(), id)
    }

    pub(crate) fn completion_in<'a>(&'a self, index: &ChildIndex<'a>, id: &str) -> Option<u8> {
        let descendants = self.descendants_in(index, id);
        if descendants.is_empty() {
            return None;
        }

        let total = descendants.len();
        let done = descendants.iter().filter(|t| t.completed).count();
        Some(((200 * done + total) / (2 * total)) as u8)
    }

    pub fn stats(&self) -> Stats {
        let total = self.tasks.len();
        let completed = self.tasks.iter().filter(|t| t.completed).count();
        Stats {
            total,
            completed,
            pending: total - completed,
        }
    }
}
