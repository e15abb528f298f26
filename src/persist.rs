// Versioned persistence of the task collection and legacy migration

use crate::date;
use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::task::Task;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::Error as _;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

/// Key holding the current document format
pub const CURRENT_KEY: &str = "taskflow-tasks-v2";

/// Key of the flat, pre-hierarchy format
pub const LEGACY_KEY: &str = "taskflow-tasks";

/// Where `load` found its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Current,
    /// Converted from the legacy key and written under the current key
    Migrated {
        count: usize,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub tasks: Vec<Task>,
    pub source: LoadSource,
}

/// Reads and writes the task collection through a [`KvStore`]
pub struct Persistence<K: KvStore> {
    kv: K,
    current_key: String,
    legacy_key: String,
    clear_legacy: bool,
}

impl<K: KvStore> Persistence<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            current_key: CURRENT_KEY.to_string(),
            legacy_key: LEGACY_KEY.to_string(),
            clear_legacy: false,
        }
    }

    pub fn with_keys(mut self, current: impl Into<String>, legacy: impl Into<String>) -> Self {
        self.current_key = current.into();
        self.legacy_key = legacy.into();
        self
    }

    /// Remove the legacy key once a migration has been written
    pub fn clear_legacy(mut self, clear: bool) -> Self {
        self.clear_legacy = clear;
        self
    }

    pub fn current_key(&self) -> &str {
        &self.current_key
    }

    pub fn legacy_key(&self) -> &str {
        &self.legacy_key
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn into_kv(self) -> K {
        self.kv
    }

    /// Load the collection, migrating the legacy format when needed
    ///
    /// Corrupted data is reported as an error and left in storage untouched.
    pub fn load(&mut self) -> Result<Loaded> {
        if let Some(raw) = self.read(&self.current_key)? {
            let tasks = decode(&self.current_key, &raw)?;
            info!(key = %self.current_key, count = tasks.len(), "Loaded tasks");
            return Ok(Loaded {
                tasks,
                source: LoadSource::Current,
            });
        }

        let Some(raw) = self.read(&self.legacy_key)? else {
            debug!("No stored tasks, starting empty");
            return Ok(Loaded {
                tasks: Vec::new(),
                source: LoadSource::Empty,
            });
        };

        let tasks = migrate_legacy(&self.legacy_key, &raw, Utc::now(), date::today())?;
        self.save(&tasks)?;

        if self.clear_legacy {
            self.kv.remove(&self.legacy_key).map_err(|source| Error::Write {
                key: self.legacy_key.clone(),
                source,
            })?;
        }

        info!(
            from = %self.legacy_key,
            to = %self.current_key,
            count = tasks.len(),
            cleared = self.clear_legacy,
            "Migrated legacy tasks"
        );
        let count = tasks.len();
        Ok(Loaded {
            tasks,
            source: LoadSource::Migrated { count },
        })
    }

    /// Write the full collection under the current key
    pub fn save(&mut self, tasks: &[Task]) -> Result<()> {
        let raw = encode(tasks)?;
        self.kv.set(&self.current_key, &raw).map_err(|source| Error::Write {
            key: self.current_key.clone(),
            source,
        })?;
        debug!(key = %self.current_key, count = tasks.len(), "Saved tasks");
        Ok(())
    }

    /// Stored value under `key`; an empty string counts as nothing stored
    fn read(&self, key: &str) -> Result<Option<String>> {
        let raw = self.kv.get(key).map_err(|source| Error::Read {
            key: key.to_string(),
            source,
        })?;

        match raw {
            Some(raw) if raw.is_empty() => {
                debug!(key, "Empty value, treating as absent");
                Ok(None)
            }
            raw => Ok(raw),
        }
    }
}

pub fn encode(tasks: &[Task]) -> Result<String> {
    serde_json::to_string(tasks).map_err(Error::Encode)
}

/// Parse a current-format document and check id uniqueness
pub fn decode(key: &str, raw: &str) -> Result<Vec<Task>> {
    let tasks: Vec<Task> = serde_json::from_str(raw).map_err(|source| Error::Decode {
        key: key.to_string(),
        source,
    })?;
    check_unique_ids(&tasks)?;
    Ok(tasks)
}

fn check_unique_ids(tasks: &[Task]) -> Result<()> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(Error::DuplicateId(task.id.clone()));
        }
    }
    Ok(())
}

/// Convert a legacy flat list into current-format tasks
///
/// Pure given `now` and `today`, so running it twice on the same payload
/// yields the same collection.
pub fn migrate_legacy(key: &str, raw: &str, now: DateTime<Utc>, today: NaiveDate) -> Result<Vec<Task>> {
    let corrupted = |source: serde_json::Error| Error::Decode {
        key: key.to_string(),
        source,
    };

    let records: Vec<Value> = serde_json::from_str(raw).map_err(corrupted)?;
    let mut tasks = Vec::with_capacity(records.len());

    for (idx, record) in records.into_iter().enumerate() {
        let Value::Object(mut fields) = record else {
            return Err(corrupted(serde_json::Error::custom(format!(
                "legacy record {} is not an object",
                idx
            ))));
        };

        let id = match fields.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(corrupted(serde_json::Error::custom(format!(
                    "legacy record {} has no usable id",
                    idx
                ))));
            }
        };

        let created = fields.get("createdAt").and_then(Value::as_str);
        let day = created.and_then(date::date_of_timestamp).unwrap_or(today);
        // Valid timestamps stay verbatim; a bare date becomes its midnight UTC
        let created_at = match created {
            Some(raw) if raw.parse::<DateTime<Utc>>().is_ok() => None,
            Some(raw) if date::date_of_timestamp(raw).is_some() => Some(day.and_time(NaiveTime::MIN).and_utc()),
            _ => Some(now),
        };

        fields.insert("id".to_string(), Value::String(id));
        fields.insert("parentId".to_string(), Value::Null);
        fields.insert("date".to_string(), Value::String(day.format(date::ISO_FORMAT).to_string()));
        fields.insert("subject".to_string(), Value::String(String::new()));
        fields.insert("tag".to_string(), Value::String(String::new()));
        fields.insert("expanded".to_string(), Value::Bool(true));
        fields.entry("completed").or_insert(Value::Bool(false));
        fields.entry("priority").or_insert_with(|| Value::String("medium".to_string()));
        if let Some(created_at) = created_at {
            debug!(record = idx, %created_at, "Rebuilt legacy createdAt");
            fields.insert("createdAt".to_string(), Value::String(created_at.to_rfc3339()));
        }

        let task: Task = serde_json::from_value(Value::Object(fields)).map_err(corrupted)?;
        tasks.push(task);
    }

    check_unique_ids(&tasks)?;
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KvError, MemoryKv};
    use crate::task::{NewTask, Priority};
    use crate::tasks::TaskList;

    const LEGACY: &str = r#"[
        {"id": 1700000000000, "text": "Old task", "completed": true, "priority": "high",
         "createdAt": "2023-11-14T22:13:20.000Z"},
        {"id": "abc", "text": "No timestamp", "completed": false, "priority": "low"}
    ]"#;

    fn fixed_now() -> DateTime<Utc> {
        "2024-05-06T07:08:09Z".parse().unwrap()
    }

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    fn sample_tasks() -> Vec<Task> {
        let mut list = TaskList::new();
        let r = list
            .add_task(NewTask::new("Root").date("2024-01-01").tag("t"), None)
            .unwrap();
        let c = list.add_subtask(&r.id, "Child").unwrap();
        list.toggle_completion(&c.id);
        list.toggle_expanded(&r.id);
        list.into_tasks()
    }

    #[test]
    fn test_round_trip() {
        let tasks = sample_tasks();
        let raw = encode(&tasks).unwrap();
        assert_eq!(decode(CURRENT_KEY, &raw).unwrap(), tasks);
    }

    #[test]
    fn test_decode_rejects_duplicates() {
        let mut tasks = sample_tasks();
        tasks[1].id = tasks[0].id.clone();
        let raw = encode(&tasks).unwrap();

        assert!(matches!(decode(CURRENT_KEY, &raw), Err(Error::DuplicateId(_))));
    }

    #[test]
    fn test_load_empty() {
        let mut p = Persistence::new(MemoryKv::new());
        let loaded = p.load().unwrap();

        assert!(loaded.tasks.is_empty());
        assert_eq!(loaded.source, LoadSource::Empty);
        assert_eq!(p.kv().get(CURRENT_KEY).unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let tasks = sample_tasks();
        let mut p = Persistence::new(MemoryKv::new());
        p.save(&tasks).unwrap();

        let loaded = p.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Current);
        assert_eq!(loaded.tasks, tasks);
    }

    #[test]
    fn test_load_corrupted_is_error_and_keeps_data() {
        let mut kv = MemoryKv::new();
        kv.set(CURRENT_KEY, "{definitely not tasks").unwrap();
        let mut p = Persistence::new(kv);

        let err = p.load().unwrap_err();
        assert!(err.is_corrupted());
        assert!(matches!(err, Error::Decode { ref key, .. } if key == CURRENT_KEY));
        assert_eq!(
            p.kv().get(CURRENT_KEY).unwrap().as_deref(),
            Some("{definitely not tasks")
        );
    }

    #[test]
    fn test_current_key_wins_over_legacy() {
        let tasks = sample_tasks();
        let mut kv = MemoryKv::new();
        kv.set(LEGACY_KEY, LEGACY).unwrap();
        kv.set(CURRENT_KEY, &encode(&tasks).unwrap()).unwrap();

        let loaded = Persistence::new(kv).load().unwrap();
        assert_eq!(loaded.source, LoadSource::Current);
        assert_eq!(loaded.tasks, tasks);
    }

    #[test]
    fn test_migrate_legacy_fields() {
        let tasks = migrate_legacy(LEGACY_KEY, LEGACY, fixed_now(), fixed_today()).unwrap();
        assert_eq!(tasks.len(), 2);

        let old = &tasks[0];
        assert_eq!(old.id, "1700000000000");
        assert_eq!(old.parent_id, None);
        assert_eq!(old.text, "Old task");
        assert_eq!(old.date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(old.subject, "");
        assert_eq!(old.tag, "");
        assert_eq!(old.priority, Priority::High);
        assert!(old.completed);
        assert!(old.expanded);

        let undated = &tasks[1];
        assert_eq!(undated.id, "abc");
        assert_eq!(undated.date, fixed_today());
        assert_eq!(undated.created_at, fixed_now());
    }

    #[test]
    fn test_migrate_overrides_stale_hierarchy_fields() {
        let raw = r#"[{"id": 7, "text": "x", "parentId": "9", "subject": "s", "tag": "t",
            "expanded": false, "completed": false, "priority": "medium",
            "createdAt": "2022-01-02T03:04:05Z", "note": "kept"}]"#;
        let tasks = migrate_legacy(LEGACY_KEY, raw, fixed_now(), fixed_today()).unwrap();

        assert_eq!(tasks[0].parent_id, None);
        assert_eq!(tasks[0].subject, "");
        assert_eq!(tasks[0].tag, "");
        assert!(tasks[0].expanded);
        assert_eq!(tasks[0].extra.get("note"), Some(&Value::from("kept")));
    }

    #[test]
    fn test_migrate_date_only_created_at() {
        let raw = r#"[{"id":5,"text":"x","completed":false,"priority":"low","createdAt":"2023-11-14"}]"#;
        let tasks = migrate_legacy(LEGACY_KEY, raw, fixed_now(), fixed_today()).unwrap();

        assert_eq!(tasks[0].id, "5");
        assert_eq!(tasks[0].date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(
            tasks[0].created_at,
            "2023-11-14T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_migrate_unreadable_created_at() {
        let raw = r#"[{"id":6,"text":"x","createdAt":"last week"},{"id":7,"text":"y","createdAt":12}]"#;
        let tasks = migrate_legacy(LEGACY_KEY, raw, fixed_now(), fixed_today()).unwrap();

        for task in &tasks {
            assert_eq!(task.date, fixed_today());
            assert_eq!(task.created_at, fixed_now());
        }
    }

    #[test]
    fn test_load_migrates_date_only_created_at() {
        let mut kv = MemoryKv::new();
        kv.set(LEGACY_KEY, r#"[{"id":5,"text":"x","completed":false,"priority":"low","createdAt":"2023-11-14"}]"#)
            .unwrap();
        let mut p = Persistence::new(kv);

        let loaded = p.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Migrated { count: 1 });
        assert_eq!(p.load().unwrap().tasks, loaded.tasks);
    }

    #[test]
    fn test_empty_current_value_falls_through_to_legacy() {
        let mut kv = MemoryKv::new();
        kv.set(CURRENT_KEY, "").unwrap();
        kv.set(LEGACY_KEY, LEGACY).unwrap();
        let mut p = Persistence::new(kv);

        let loaded = p.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Migrated { count: 2 });
        assert!(!p.kv().get(CURRENT_KEY).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_empty_values_load_as_empty() {
        let mut kv = MemoryKv::new();
        kv.set(CURRENT_KEY, "").unwrap();
        kv.set(LEGACY_KEY, "").unwrap();

        let loaded = Persistence::new(kv).load().unwrap();
        assert_eq!(loaded.source, LoadSource::Empty);
        assert!(loaded.tasks.is_empty());
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let once = migrate_legacy(LEGACY_KEY, LEGACY, fixed_now(), fixed_today()).unwrap();
        let twice = migrate_legacy(LEGACY_KEY, LEGACY, fixed_now(), fixed_today()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_migrate_rejects_bad_records() {
        let err = migrate_legacy(LEGACY_KEY, "[42]", fixed_now(), fixed_today()).unwrap_err();
        assert!(matches!(err, Error::Decode { ref key, .. } if key == LEGACY_KEY));

        let err = migrate_legacy(LEGACY_KEY, r#"[{"text": "no id"}]"#, fixed_now(), fixed_today()).unwrap_err();
        assert!(err.is_corrupted());
    }

    #[test]
    fn test_load_migrates_once_and_keeps_legacy() {
        let mut kv = MemoryKv::new();
        kv.set(LEGACY_KEY, LEGACY).unwrap();
        let mut p = Persistence::new(kv);

        let first = p.load().unwrap();
        assert_eq!(first.source, LoadSource::Migrated { count: 2 });
        assert!(p.kv().get(CURRENT_KEY).unwrap().is_some());
        assert_eq!(p.kv().get(LEGACY_KEY).unwrap().as_deref(), Some(LEGACY));

        let second = p.load().unwrap();
        assert_eq!(second.source, LoadSource::Current);
        assert_eq!(second.tasks, first.tasks);
    }

    #[test]
    fn test_load_migration_can_clear_legacy() {
        let mut kv = MemoryKv::new();
        kv.set(LEGACY_KEY, LEGACY).unwrap();
        let mut p = Persistence::new(kv).clear_legacy(true);

        p.load().unwrap();
        assert_eq!(p.kv().get(LEGACY_KEY).unwrap(), None);
        assert!(p.kv().get(CURRENT_KEY).unwrap().is_some());
    }

    #[test]
    fn test_failed_migration_write_keeps_legacy() {
        let mut kv = MemoryKv::with_quota(LEGACY_KEY.len() + LEGACY.len() + 10);
        kv.set(LEGACY_KEY, LEGACY).unwrap();
        let mut p = Persistence::new(kv).clear_legacy(true);

        let err = p.load().unwrap_err();
        assert!(matches!(
            err,
            Error::Write {
                source: KvError::QuotaExceeded { .. },
                ..
            }
        ));
        assert_eq!(p.kv().get(LEGACY_KEY).unwrap().as_deref(), Some(LEGACY));
        assert_eq!(p.kv().get(CURRENT_KEY).unwrap(), None);
    }

    #[test]
    fn test_custom_keys() {
        let tasks = sample_tasks();
        let mut p = Persistence::new(MemoryKv::new()).with_keys("v3", "v2");
        p.save(&tasks).unwrap();

        assert!(p.kv().get("v3").unwrap().is_some());
        assert_eq!(p.kv().get(CURRENT_KEY).unwrap(), None);
        assert_eq!(p.current_key(), "v3");
        assert_eq!(p.legacy_key(), "v2");
    }
}
