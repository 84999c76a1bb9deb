//! File-backed task store: one YAML document holding every task and a
//! capped execution history, replaced atomically on each write.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::error;

use argus_model::{ScheduledTask, TaskExecution};

use crate::error::Result;

const MAX_EXECUTIONS: usize = 1000;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    tasks: Vec<ScheduledTask>,
    /// Newest first.
    #[serde(default)]
    executions: Vec<TaskExecution>,
}

/// Serialized single-writer store. Every mutation reads the document,
/// applies the change, and replaces the file through a rename so readers
/// always see a consistent snapshot.
pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = TaskStore {
            path,
            lock: Mutex::new(()),
        };
        if !store.path.exists() {
            store.write_document(&StoreDocument::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StoreDocument {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_yaml::from_str(&text).unwrap_or_else(|e| {
                error!(path = %self.path.display(), error = %e, "task store unreadable");
                StoreDocument::default()
            }),
            Err(_) => StoreDocument::default(),
        }
    }

    fn write_document(&self, document: &StoreDocument) -> Result<()> {
        let text = serde_yaml::to_string(document)?;
        let tmp = self.path.with_extension("yaml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate(&self, apply: impl FnOnce(&mut StoreDocument)) -> Result<()> {
        let _guard = self.lock.lock().expect("task store lock");
        let mut document = self.read_document();
        apply(&mut document);
        self.write_document(&document)
    }

    // Task records

    pub fn save_task(&self, task: &ScheduledTask) -> Result<()> {
        self.mutate(|doc| {
            match doc.tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => doc.tasks.push(task.clone()),
            }
        })
    }

    pub fn get_task(&self, task_id: &str) -> Option<ScheduledTask> {
        let _guard = self.lock.lock().expect("task store lock");
        self.read_document()
            .tasks
            .into_iter()
            .find(|t| t.id == task_id)
    }

    pub fn all_tasks(&self) -> Vec<ScheduledTask> {
        let _guard = self.lock.lock().expect("task store lock");
        self.read_document().tasks
    }

    pub fn delete_task(&self, task_id: &str) -> Result<bool> {
        let mut removed = false;
        self.mutate(|doc| {
            let before = doc.tasks.len();
            doc.tasks.retain(|t| t.id != task_id);
            removed = doc.tasks.len() < before;
        })?;
        Ok(removed)
    }

    // Execution records

    pub fn save_execution(&self, execution: &TaskExecution) -> Result<()> {
        self.mutate(|doc| {
            match doc.executions.iter_mut().find(|e| e.id == execution.id) {
                Some(existing) => *existing = execution.clone(),
                None => doc.executions.insert(0, execution.clone()),
            }
            doc.executions.truncate(MAX_EXECUTIONS);
        })
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<TaskExecution> {
        let _guard = self.lock.lock().expect("task store lock");
        self.read_document()
            .executions
            .into_iter()
            .find(|e| e.id == execution_id)
    }

    /// Newest executions first, optionally filtered by task.
    pub fn get_executions(&self, task_id: Option<&str>, limit: usize) -> Vec<TaskExecution> {
        let _guard = self.lock.lock().expect("task store lock");
        self.read_document()
            .executions
            .into_iter()
            .filter(|e| task_id.is_none_or(|id| e.task_id == id))
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_model::TaskStatus;

    fn store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("scheduler.yaml")).unwrap();
        (dir, store)
    }

    #[test]
    fn tasks_round_trip() {
        let (_dir, store) = store();
        let mut task = ScheduledTask::create("sweep");
        store.save_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap();
        assert_eq!(loaded.name, "sweep");

        task.name = "renamed".to_string();
        store.save_task(&task).unwrap();
        assert_eq!(store.all_tasks().len(), 1);
        assert_eq!(store.get_task(&task.id).unwrap().name, "renamed");

        assert!(store.delete_task(&task.id).unwrap());
        assert!(!store.delete_task(&task.id).unwrap());
        assert!(store.get_task(&task.id).is_none());
    }

    #[test]
    fn executions_are_newest_first_and_capped() {
        let (_dir, store) = store();
        let task = ScheduledTask::create("t");
        for _ in 0..3 {
            let execution = TaskExecution::create(&task);
            store.save_execution(&execution).unwrap();
        }
        let executions = store.get_executions(None, 10);
        assert_eq!(executions.len(), 3);

        // Updating in place must not duplicate.
        let mut latest = executions[0].clone();
        latest.status = TaskStatus::Completed;
        store.save_execution(&latest).unwrap();
        assert_eq!(store.get_executions(None, 10).len(), 3);
        assert_eq!(
            store.get_execution(&latest.id).unwrap().status,
            TaskStatus::Completed
        );
    }

    #[test]
    fn execution_filter_by_task() {
        let (_dir, store) = store();
        let a = ScheduledTask::create("a");
        let b = ScheduledTask::create("b");
        store.save_execution(&TaskExecution::create(&a)).unwrap();
        store.save_execution(&TaskExecution::create(&b)).unwrap();
        store.save_execution(&TaskExecution::create(&a)).unwrap();

        assert_eq!(store.get_executions(Some(&a.id), 10).len(), 2);
        assert_eq!(store.get_executions(Some(&b.id), 10).len(), 1);
        assert_eq!(store.get_executions(Some("nope"), 10).len(), 0);
    }

    #[test]
    fn surviving_a_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.yaml");
        std::fs::write(&path, ":: not yaml ::").unwrap();
        let store = TaskStore::open(&path).unwrap();
        assert!(store.all_tasks().is_empty());
    }
}
