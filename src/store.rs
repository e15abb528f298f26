// Task store with write-through persistence

use crate::error::Result;
use crate::filter::Filter;
use crate::kv::KvStore;
use crate::persist::{LoadSource, Persistence};
use crate::task::{NewTask, Stats, Task};
use crate::tasks::TaskList;
use crate::view::{self, Row};
use tracing::{debug, info};

/// Owns the task collection and keeps storage in step with it
///
/// Every operation that changes state writes the full collection under the
/// current key before returning. If that write fails the change stays
/// applied in memory and the error is returned; [`TaskStore::save`] retries.
/// No-ops (blank text, unknown ids) never touch storage.
pub struct TaskStore<K: KvStore> {
    list: TaskList,
    persistence: Persistence<K>,
    source: LoadSource,
}

impl<K: KvStore> TaskStore<K> {
    /// Load (and if needed migrate) the stored collection
    pub fn open(mut persistence: Persistence<K>) -> Result<Self> {
        let loaded = persistence.load()?;
        info!(count = loaded.tasks.len(), source = ?loaded.source, "Opened task store");

        Ok(Self {
            list: TaskList::from_tasks(loaded.tasks),
            persistence,
            source: loaded.source,
        })
    }

    pub fn load_source(&self) -> LoadSource {
        self.source
    }

    pub fn list(&self) -> &TaskList {
        &self.list
    }

    pub fn persistence(&self) -> &Persistence<K> {
        &self.persistence
    }

    /// Write the whole collection again
    pub fn save(&mut self) -> Result<()> {
        self.persistence.save(self.list.tasks())
    }

    fn persist_if(&mut self, changed: bool) -> Result<()> {
        if changed {
            self.save()
        } else {
            debug!("No change, skipping write");
            Ok(())
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn add_task(&mut self, fields: NewTask, parent_id: Option<&str>) -> Result<Option<Task>> {
        let task = self.list.add_task(fields, parent_id);
        self.persist_if(task.is_some())?;
        Ok(task)
    }

    pub fn add_subtask(&mut self, parent_id: &str, text: &str) -> Result<Option<Task>> {
        let task = self.list.add_subtask(parent_id, text);
        self.persist_if(task.is_some())?;
        Ok(task)
    }

    pub fn delete_task(&mut self, id: &str) -> Result<usize> {
        let removed = self.list.delete_task(id);
        self.persist_if(removed > 0)?;
        Ok(removed)
    }

    pub fn toggle_completion(&mut self, id: &str) -> Result<Option<bool>> {
        let completed = self.list.toggle_completion(id);
        self.persist_if(completed.is_some())?;
        Ok(completed)
    }

    pub fn toggle_expanded(&mut self, id: &str) -> Result<Option<bool>> {
        let expanded = self.list.toggle_expanded(id);
        self.persist_if(expanded.is_some())?;
        Ok(expanded)
    }

    pub fn edit_text(&mut self, id: &str, new_text: &str) -> Result<bool> {
        let changed = self.list.edit_text(id, new_text);
        self.persist_if(changed)?;
        Ok(changed)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.list.find(id)
    }

    pub fn children(&self, parent_id: &str) -> Vec<&Task> {
        self.list.children(parent_id)
    }

    pub fn roots(&self) -> Vec<&Task> {
        self.list.roots()
    }

    pub fn descendants(&self, id: &str) -> Vec<&Task> {
        self.list.descendants(id)
    }

    pub fn completion_percentage(&self, id: &str) -> Option<u8> {
        self.list.completion_percentage(id)
    }

    pub fn stats(&self) -> Stats {
        self.list.stats()
    }

    pub fn is_visible(&self, task: &Task, filter: &Filter) -> bool {
        filter.is_visible(&self.list, task)
    }

    pub fn render(&self, filter: &Filter) -> Vec<Row<'_>> {
        view::render(&self.list, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kv::{FileKv, KvError, MemoryKv, SqliteKv};
    use crate::persist::{CURRENT_KEY, LEGACY_KEY, decode};
    use crate::task::Priority;
    use tempfile::TempDir;

    fn open_memory() -> TaskStore<MemoryKv> {
        TaskStore::open(Persistence::new(MemoryKv::new())).unwrap()
    }

    fn stored(store: &TaskStore<MemoryKv>) -> Vec<Task> {
        let raw = store.persistence().kv().get(CURRENT_KEY).unwrap().unwrap();
        decode(CURRENT_KEY, &raw).unwrap()
    }

    #[test]
    fn test_add_root_is_written_through() {
        let mut store = open_memory();
        let task = store
            .add_task(
                NewTask::new("Buy milk").date("2024-01-01").priority(Priority::High),
                None,
            )
            .unwrap()
            .unwrap();

        let roots = store.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].text, "Buy milk");
        assert!(roots[0].parent_id.is_none());
        assert_eq!(stored(&store), vec![task]);
    }

    #[test]
    fn test_every_mutation_persists() {
        let mut store = open_memory();
        let r = store.add_task(NewTask::new("R"), None).unwrap().unwrap();
        store.toggle_expanded(&r.id).unwrap();
        assert!(!stored(&store)[0].expanded);

        let c = store.add_subtask(&r.id, "C").unwrap().unwrap();
        let parent = stored(&store).into_iter().find(|t| t.id == r.id).unwrap();
        assert!(parent.expanded);

        store.toggle_completion(&c.id).unwrap();
        assert!(stored(&store).iter().find(|t| t.id == c.id).unwrap().completed);

        store.toggle_expanded(&r.id).unwrap();
        assert!(!stored(&store).iter().find(|t| t.id == r.id).unwrap().expanded);

        store.edit_text(&r.id, "Renamed").unwrap();
        assert_eq!(stored(&store)[0].text, "Renamed");

        assert_eq!(store.delete_task(&r.id).unwrap(), 2);
        assert!(stored(&store).is_empty());
    }

    #[test]
    fn test_noops_do_not_write() {
        let mut store = open_memory();
        assert_eq!(store.add_task(NewTask::new("  "), None).unwrap(), None);
        assert_eq!(store.add_subtask("ghost", "x").unwrap(), None);
        assert_eq!(store.delete_task("ghost").unwrap(), 0);
        assert_eq!(store.toggle_completion("ghost").unwrap(), None);
        assert!(!store.edit_text("ghost", "x").unwrap());

        assert_eq!(store.persistence().kv().get(CURRENT_KEY).unwrap(), None);
    }

    #[test]
    fn test_blank_edit_keeps_text() {
        let mut store = open_memory();
        let r = store.add_task(NewTask::new("Keep"), None).unwrap().unwrap();

        assert!(!store.edit_text(&r.id, "   ").unwrap());
        assert_eq!(store.find(&r.id).unwrap().text, "Keep");
    }

    #[test]
    fn test_write_failure_is_reported_and_memory_keeps_change() {
        let mut store = TaskStore::open(Persistence::new(MemoryKv::with_quota(400))).unwrap();
        let r = store.add_task(NewTask::new("R"), None).unwrap().unwrap();

        let mut failure = None;
        for i in 0..10 {
            if let Err(e) = store.add_subtask(&r.id, &format!("child {}", i)) {
                failure = Some(e);
                break;
            }
        }

        let err = failure.expect("quota should eventually be exceeded");
        assert!(matches!(
            err,
            Error::Write {
                source: KvError::QuotaExceeded { .. },
                ..
            }
        ));
        assert!(store.list().len() > stored(&store).len());
        assert!(matches!(store.save(), Err(Error::Write { .. })));
    }

    #[test]
    fn test_reopen_sees_previous_session() {
        let temp = TempDir::new().unwrap();

        let mut store = TaskStore::open(Persistence::new(FileKv::open(temp.path()).unwrap())).unwrap();
        let r = store.add_task(NewTask::new("R"), None).unwrap().unwrap();
        let c = store.add_subtask(&r.id, "C").unwrap().unwrap();
        store.toggle_completion(&c.id).unwrap();
        drop(store);

        let store = TaskStore::open(Persistence::new(FileKv::open(temp.path()).unwrap())).unwrap();
        assert_eq!(store.load_source(), LoadSource::Current);
        assert_eq!(store.completion_percentage(&r.id), Some(100));
        assert_eq!(store.children(&r.id).len(), 1);
    }

    #[test]
    fn test_open_migrates_legacy_in_sqlite() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("taskflow.db");

        let mut kv = SqliteKv::open(&db_path).unwrap();
        kv.set(LEGACY_KEY, r#"[{"id": 1, "text": "old", "completed": false, "priority": "low"}]"#)
            .unwrap();

        let store = TaskStore::open(Persistence::new(kv)).unwrap();
        assert_eq!(store.load_source(), LoadSource::Migrated { count: 1 });
        assert_eq!(store.roots()[0].id, "1");
        drop(store);

        let store = TaskStore::open(Persistence::new(SqliteKv::open(&db_path).unwrap())).unwrap();
        assert_eq!(store.load_source(), LoadSource::Current);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_open_corrupted_fails() {
        let mut kv = MemoryKv::new();
        kv.set(CURRENT_KEY, "[{\"id\": 3}]").unwrap();

        let err = TaskStore::open(Persistence::new(kv)).err().unwrap();
        assert!(err.is_corrupted());
    }

    #[test]
    fn test_scenario_fifty_percent() {
        let mut store = open_memory();
        let r = store.add_task(NewTask::new("R"), None).unwrap().unwrap();
        let c1 = store.add_subtask(&r.id, "C1").unwrap().unwrap();
        store.add_subtask(&r.id, "C2").unwrap().unwrap();
        store.toggle_completion(&c1.id).unwrap();

        assert_eq!(store.completion_percentage(&r.id), Some(50));
        assert_eq!(store.descendants(&r.id).len(), 2);
        assert!(store.is_visible(store.find(&r.id).unwrap(), &Filter::default()));
        assert_eq!(store.render(&Filter::default()).len(), 3);
        assert_eq!(store.stats().completed, 1);
    }
}
