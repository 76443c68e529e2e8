//! Task persistence port and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::task::{TaskId, TaskReminderRecord};

pub trait TaskStore: Send + Sync {
    /// `Ok(None)` when the task does not exist (or no longer exists).
    fn fetch(&self, id: TaskId) -> Result<Option<TaskReminderRecord>, StoreError>;

    fn save(&self, task: &TaskReminderRecord) -> Result<(), StoreError>;

    /// Active tasks that carry any reminder configuration.
    fn reminder_candidates(&self) -> Result<Vec<TaskReminderRecord>, StoreError>;
}

impl<S: TaskStore + ?Sized> TaskStore for std::sync::Arc<S> {
    fn fetch(&self, id: TaskId) -> Result<Option<TaskReminderRecord>, StoreError> {
        (**self).fetch(id)
    }

    fn save(&self, task: &TaskReminderRecord) -> Result<(), StoreError> {
        (**self).save(task)
    }

    fn reminder_candidates(&self) -> Result<Vec<TaskReminderRecord>, StoreError> {
        (**self).reminder_candidates()
    }
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<BTreeMap<TaskId, TaskReminderRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = TaskReminderRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.lock();
            for t in tasks {
                map.insert(t.id, t);
            }
        }
        store
    }

    pub fn insert(&self, task: TaskReminderRecord) {
        self.lock().insert(task.id, task);
    }

    pub fn remove(&self, id: TaskId) -> Option<TaskReminderRecord> {
        self.lock().remove(&id)
    }

    pub fn all(&self) -> Vec<TaskReminderRecord> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<TaskId, TaskReminderRecord>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskStore for MemoryTaskStore {
    fn fetch(&self, id: TaskId) -> Result<Option<TaskReminderRecord>, StoreError> {
        Ok(self.lock().get(&id).cloned())
    }

    fn save(&self, task: &TaskReminderRecord) -> Result<(), StoreError> {
        self.lock().insert(task.id, task.clone());
        Ok(())
    }

    fn reminder_candidates(&self) -> Result<Vec<TaskReminderRecord>, StoreError> {
        Ok(self
            .lock()
            .values()
            .filter(|t| t.wants_reminders())
            .cloned()
            .collect())
    }
}
