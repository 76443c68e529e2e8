use anyhow::{Context, Result, bail};
use astrid_core::{
    AlarmId, QueueEntry, StoreError, TaskAlarm, TaskId, TaskReminderRecord, TaskStore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

/// `$ASTRID_HOME`, or `~/.astrid`.
pub fn astrid_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ASTRID_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".astrid"))
}

pub fn ensure_astrid_home() -> Result<PathBuf> {
    let dir = astrid_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn tasks_path() -> Result<PathBuf> {
    Ok(ensure_astrid_home()?.join("tasks.json"))
}

pub fn queue_path() -> Result<PathBuf> {
    Ok(ensure_astrid_home()?.join("queue.json"))
}

pub fn notifications_path() -> Result<PathBuf> {
    Ok(ensure_astrid_home()?.join("notifications.jsonl"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default = "first_id")]
    pub next_id: TaskId,
    #[serde(default = "first_id")]
    pub next_alarm_id: AlarmId,
    #[serde(default)]
    pub tasks: Vec<TaskReminderRecord>,
}

fn first_id() -> i64 {
    1
}

impl Default for TaskFile {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            next_alarm_id: first_id(),
            tasks: Vec::new(),
        }
    }
}

impl TaskFile {
    fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskReminderRecord> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }
}

/// Task store backed by a single JSON document.
///
/// Every call re-reads the file so edits from other `astrid` processes are
/// picked up; writes go through a temp file and a rename.
#[derive(Debug)]
pub struct JsonTaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonTaskStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last modification of the backing file, if it exists.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> Result<TaskFile> {
        if !self.path.exists() {
            return Ok(TaskFile::default());
        }
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        if s.trim().is_empty() {
            return Ok(TaskFile::default());
        }
        serde_json::from_str(&s).with_context(|| format!("parse {}", self.path.display()))
    }

    fn write(&self, file: &TaskFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(file)?;
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<TaskReminderRecord>> {
        let _g = self.guard();
        Ok(self.read()?.tasks)
    }

    /// Allocate an id and persist the task `build` returns for it.
    pub fn create(&self, build: impl FnOnce(TaskId) -> TaskReminderRecord) -> Result<TaskReminderRecord> {
        let _g = self.guard();
        let mut file = self.read()?;
        let task = build(file.next_id);
        file.next_id = file.next_id.max(task.id) + 1;
        file.tasks.push(task.clone());
        self.write(&file)?;
        Ok(task)
    }

    /// Apply `f` to task `id` and persist the result.
    pub fn update(&self, id: TaskId, f: impl FnOnce(&mut TaskReminderRecord)) -> Result<TaskReminderRecord> {
        let _g = self.guard();
        let mut file = self.read()?;
        let Some(task) = file.get_mut(id) else {
            bail!("no task with id {id}");
        };
        f(task);
        let updated = task.clone();
        self.write(&file)?;
        Ok(updated)
    }

    pub fn add_alarm(&self, task_id: TaskId, time: DateTime<Utc>) -> Result<TaskAlarm> {
        let _g = self.guard();
        let mut file = self.read()?;
        let alarm = TaskAlarm {
            id: file.next_alarm_id,
            time,
        };
        let Some(task) = file.get_mut(task_id) else {
            bail!("no task with id {task_id}");
        };
        task.alarms.push(alarm);
        file.next_alarm_id += 1;
        self.write(&file)?;
        Ok(alarm)
    }
}

impl TaskStore for JsonTaskStore {
    fn fetch(&self, id: TaskId) -> Result<Option<TaskReminderRecord>, StoreError> {
        let _g = self.guard();
        let file = self.read().map_err(|e| StoreError::Unavailable(format!("{e:#}")))?;
        Ok(file.tasks.into_iter().find(|t| t.id == id))
    }

    fn save(&self, task: &TaskReminderRecord) -> Result<(), StoreError> {
        let _g = self.guard();
        let mut file = self.read().map_err(|e| StoreError::Unavailable(format!("{e:#}")))?;
        match file.get_mut(task.id) {
            Some(existing) => *existing = task.clone(),
            None => {
                file.next_id = file.next_id.max(task.id + 1);
                file.tasks.push(task.clone());
            }
        }
        self.write(&file)
            .map_err(|e| StoreError::Save(task.id, format!("{e:#}")))
    }

    fn reminder_candidates(&self) -> Result<Vec<TaskReminderRecord>, StoreError> {
        let _g = self.guard();
        let file = self.read().map_err(|e| StoreError::Unavailable(format!("{e:#}")))?;
        Ok(file.tasks.into_iter().filter(|t| t.wants_reminders()).collect())
    }
}

/// Pending queue entries as last written by an `astrid` process.
///
/// `Ok(None)` when no snapshot exists yet.
pub fn load_queue_snapshot(path: &Path) -> Result<Option<Vec<QueueEntry>>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let entries = serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(entries))
}

pub fn save_queue_snapshot(path: &Path, entries: &[QueueEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_core::{ReminderFlags, ReminderType};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn create_allocates_increasing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("tasks.json"));

        let a = store.create(|id| TaskReminderRecord::new(id, "a", now())).unwrap();
        let b = store.create(|id| TaskReminderRecord::new(id, "b", now())).unwrap();

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn save_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("tasks.json"));
        let task = store
            .create(|id| TaskReminderRecord::new(id, "pay rent", now()).with_flags(ReminderFlags::AT_DEADLINE))
            .unwrap();

        let mut t = store.fetch(task.id).unwrap().unwrap();
        t.reminder_last = Some(now() + Duration::hours(1));
        store.save(&t).unwrap();

        let reopened = JsonTaskStore::open(store.path().to_path_buf());
        assert_eq!(reopened.fetch(task.id).unwrap(), Some(t));
        assert_eq!(reopened.fetch(99).unwrap(), None);
    }

    #[test]
    fn candidates_skip_completed_and_plain_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("tasks.json"));
        store.create(|id| TaskReminderRecord::new(id, "plain", now())).unwrap();
        let done = store
            .create(|id| TaskReminderRecord::new(id, "done", now()).with_period(Duration::hours(4)))
            .unwrap();
        store.update(done.id, |t| t.completed_at = Some(now())).unwrap();
        let live = store
            .create(|id| TaskReminderRecord::new(id, "live", now()).with_period(Duration::hours(4)))
            .unwrap();

        let ids: Vec<TaskId> = store.reminder_candidates().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![live.id]);
    }

    #[test]
    fn alarms_get_their_own_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::open(dir.path().join("tasks.json"));
        let t = store.create(|id| TaskReminderRecord::new(id, "flight", now())).unwrap();

        let first = store.add_alarm(t.id, now() + Duration::hours(2)).unwrap();
        let second = store.add_alarm(t.id, now() + Duration::hours(3)).unwrap();

        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(store.fetch(t.id).unwrap().unwrap().alarms.len(), 2);
        assert!(store.add_alarm(42, now()).is_err());
    }

    #[test]
    fn corrupt_file_is_reported_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonTaskStore::open(path);

        assert!(matches!(store.fetch(1), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn queue_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        assert!(load_queue_snapshot(&path).unwrap().is_none());

        let entries = vec![
            QueueEntry::reminder(1, now(), ReminderType::Overdue),
            QueueEntry::alarm(3, 1, now() + Duration::minutes(5)),
        ];
        save_queue_snapshot(&path, &entries).unwrap();

        assert_eq!(load_queue_snapshot(&path).unwrap(), Some(entries));
    }
}
