//! Wiring of the reminder engine for the CLI: JSON task store, console sink,
//! system clock, and whichever wake-up backend the command needs.

use anyhow::Result;
use astrid_core::{
    Dispatcher, NotificationQueue, ReminderScheduler, SystemClock, TaskNotifier, WakeScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::sink::ConsoleSink;
use crate::state::{
    JsonTaskStore, load_queue_snapshot, notifications_path, queue_path, save_queue_snapshot,
    tasks_path,
};

pub type Store = Arc<JsonTaskStore>;
pub type Scheduler = ReminderScheduler<Store, SystemClock>;
pub type CliNotifier = TaskNotifier<Store, SystemClock, ConsoleSink>;

pub struct Paths {
    pub tasks: PathBuf,
    pub queue: PathBuf,
    pub notifications: PathBuf,
}

impl Paths {
    pub fn from_home() -> Result<Self> {
        Ok(Self {
            tasks: tasks_path()?,
            queue: queue_path()?,
            notifications: notifications_path()?,
        })
    }
}

pub struct App {
    pub store: Store,
    pub scheduler: Arc<Scheduler>,
    pub dispatcher: Dispatcher<Store, SystemClock, CliNotifier>,
    queue_path: PathBuf,
}

impl App {
    pub fn build(cfg: &Config, paths: Paths, wake: Arc<dyn WakeScheduler>) -> Result<Self> {
        let prefs = cfg.preferences()?;
        let tz = prefs.timezone;
        let store: Store = Arc::new(JsonTaskStore::open(paths.tasks));
        let queue = Arc::new(NotificationQueue::new(prefs.clone(), wake));
        let scheduler = Arc::new(ReminderScheduler::new(store.clone(), SystemClock, prefs, queue));
        let notifier = TaskNotifier::new(store.clone(), SystemClock, ConsoleSink::new(paths.notifications), tz);
        let dispatcher = Dispatcher::new(scheduler.clone(), notifier);
        Ok(Self {
            store,
            scheduler,
            dispatcher,
            queue_path: paths.queue,
        })
    }

    /// Load the queue left behind by the previous process, or rescan every
    /// task when there is none.
    pub fn restore_queue(&self) -> Result<()> {
        match load_queue_snapshot(&self.queue_path)? {
            Some(entries) => {
                debug!("restoring {} queue entries", entries.len());
                for e in entries {
                    self.scheduler.queue().add(e);
                }
            }
            None => {
                let n = self.scheduler.schedule_all_alarms();
                info!("no queue snapshot, rescanned ({n} tasks scheduled)");
            }
        }
        Ok(())
    }

    pub fn save_queue(&self) -> Result<()> {
        save_queue_snapshot(&self.queue_path, &self.scheduler.queue().jobs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_core::{
        AlarmState, DueDate, RecordingWakeScheduler, ReminderFlags, TaskReminderRecord, NOTIFICATION_WAKE,
    };
    use chrono::{Duration, Utc};

    fn paths(dir: &std::path::Path) -> Paths {
        Paths {
            tasks: dir.join("tasks.json"),
            queue: dir.join("queue.json"),
            notifications: dir.join("notifications.jsonl"),
        }
    }

    #[test]
    fn queue_survives_between_processes() {
        let dir = tempfile::tempdir().unwrap();
        let due = Utc::now() + Duration::days(2);

        let first = App::build(&Config::default(), paths(dir.path()), Arc::new(RecordingWakeScheduler::new())).unwrap();
        let task = first
            .store
            .create(|id| {
                TaskReminderRecord::new(id, "book train", Utc::now())
                    .with_due(DueDate::Timed(due))
                    .with_flags(ReminderFlags::AT_DEADLINE)
            })
            .unwrap();
        first.restore_queue().unwrap();
        first.save_queue().unwrap();

        let wake = Arc::new(RecordingWakeScheduler::new());
        let second = App::build(&Config::default(), paths(dir.path()), wake.clone()).unwrap();
        second.restore_queue().unwrap();

        assert!(matches!(
            second.scheduler.alarm_state(task.id),
            AlarmState::Scheduled { time, .. } if time == due
        ));
        assert!(wake.pending(NOTIFICATION_WAKE).is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.quiet_hours.enabled = true;
        cfg.quiet_hours.start = "late".to_string();
        assert!(App::build(&cfg, paths(dir.path()), Arc::new(RecordingWakeScheduler::new())).is_err());
    }
}
