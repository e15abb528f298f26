// Data model for hierarchical tasks

use crate::error::Error;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// A single task; subtasks point at their owner through `parent_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub parent_id: Option<String>,
    pub text: String,
    /// Serialized as `yyyy-MM-dd`
    pub date: NaiveDate,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub tag: String,
    pub priority: Priority,
    pub completed: bool,
    pub expanded: bool,
    pub created_at: DateTime<Utc>,
    /// Fields written by other versions, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Lowercased text the search query is matched against
    pub fn search_haystack(&self) -> String {
        format!("{} {} {}", self.text, self.subject, self.tag).to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(Error::InvalidPriority(s.to_string())),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Raw input for a new root task, as collected from the user
///
/// `date` may be `yyyy-MM-dd`, `dd/MM/yyyy` or empty (today).
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub text: String,
    pub date: String,
    pub subject: String,
    pub tag: String,
    pub priority: Priority,
}

impl NewTask {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Collection-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}
