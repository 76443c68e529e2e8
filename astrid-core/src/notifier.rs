//! Turning fired queue entries into user-visible notifications.
//!
//! [`TaskNotifier`] re-reads the task, drops notifications that went stale
//! since they were queued, stamps `reminder_last`, and hands the result to a
//! [`NotificationSink`] (the platform's notification surface).

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::error::NotifyError;
use crate::queue::QueueEntry;
use crate::reminders::ReminderType;
use crate::store::TaskStore;
use crate::task::{DueDate, ReminderFlags, TaskId, TaskReminderRecord};
use crate::time::{at_time_of_day, ONE_DAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingMode {
    Once,
    Five,
    Nonstop,
}

impl RingMode {
    pub fn for_task(task: &TaskReminderRecord, kind: ReminderType) -> Self {
        if kind == ReminderType::Random {
            return RingMode::Once;
        }
        if task.reminder_flags.contains(ReminderFlags::MODE_NONSTOP) {
            RingMode::Nonstop
        } else if task.reminder_flags.contains(ReminderFlags::MODE_FIVE) {
            RingMode::Five
        } else {
            RingMode::Once
        }
    }

    /// `None` rings until dismissed.
    pub fn ring_times(self) -> Option<u32> {
        match self {
            RingMode::Once => Some(1),
            RingMode::Five => Some(5),
            RingMode::Nonstop => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub task_id: TaskId,
    pub title: String,
    pub kind: ReminderType,
    pub ring: RingMode,
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Inactive,
    Untitled,
    Hidden,
    DueDateChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Shown(Notification),
    Suppressed(SuppressReason),
}

/// Handles one fired queue entry.
pub trait Notifier: Send + Sync {
    fn notify(&self, job: &QueueEntry) -> Result<NotifyOutcome, NotifyError>;
}

/// Platform notification surface.
pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Remove any notification currently shown for `task_id`.
    fn dismiss(&self, _task_id: TaskId) {}
}

impl<K: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<K> {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).show(notification)
    }

    fn dismiss(&self, task_id: TaskId) {
        (**self).dismiss(task_id)
    }
}

pub struct TaskNotifier<S: TaskStore, C: Clock, K: NotificationSink> {
    store: S,
    clock: C,
    sink: K,
    timezone: Tz,
}

impl<S: TaskStore, C: Clock, K: NotificationSink> TaskNotifier<S, C, K> {
    pub fn new(store: S, clock: C, sink: K, timezone: Tz) -> Self {
        Self {
            store,
            clock,
            sink,
            timezone,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn suppress_reason(&self, task: &TaskReminderRecord, kind: ReminderType, now: DateTime<Utc>) -> Option<SuppressReason> {
        if !task.is_active() {
            return Some(SuppressReason::Inactive);
        }
        if task.title.trim().is_empty() {
            return Some(SuppressReason::Untitled);
        }
        if kind == ReminderType::Random && task.is_hidden(now) {
            return Some(SuppressReason::Hidden);
        }
        if matches!(kind, ReminderType::Due | ReminderType::Overdue) {
            // The due date moved after this reminder was queued.
            let moved = match task.due {
                None => true,
                Some(DueDate::Timed(at)) => at > now,
                Some(DueDate::AllDay(day)) => {
                    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
                    at_time_of_day(day, self.timezone, noon) - now > ONE_DAY
                }
            };
            if moved {
                return Some(SuppressReason::DueDateChanged);
            }
        }
        None
    }
}

impl<S: TaskStore, C: Clock, K: NotificationSink> Notifier for TaskNotifier<S, C, K> {
    fn notify(&self, job: &QueueEntry) -> Result<NotifyOutcome, NotifyError> {
        let task_id = job.task_id();
        let kind = job.kind();
        let Some(mut task) = self.store.fetch(task_id)? else {
            self.sink.dismiss(task_id);
            return Err(NotifyError::TaskNotFound(task_id));
        };

        let now = self.clock.now();
        if let Some(reason) = self.suppress_reason(&task, kind, now) {
            debug!("suppressing {kind} notification for task {task_id}: {reason:?}");
            self.sink.dismiss(task_id);
            return Ok(NotifyOutcome::Suppressed(reason));
        }

        task.reminder_last = Some(now);
        self.store.save(&task)?;

        let notification = Notification {
            task_id,
            title: task.title.clone(),
            kind,
            ring: RingMode::for_task(&task, kind),
            shown_at: now,
        };
        self.sink.show(&notification)?;
        Ok(NotifyOutcome::Shown(notification))
    }
}

/// Sink that keeps shown notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    shown: Mutex<Vec<Notification>>,
    failing: Mutex<Vec<TaskId>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `show` fail for `task_id`.
    pub fn fail_for(&self, task_id: TaskId) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).push(task_id);
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(&notification.task_id) {
            return Err(NotifyError::Sink(format!("task {} rejected", notification.task_id)));
        }
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
