//! ReminderScheduler: keeps exactly one pending reminder per task in the queue.
//!
//! Every (re)computation cancels whatever the task had queued before adding
//! the new entry. Failures are logged and swallowed; nothing here returns an
//! error to the task-save path.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::preferences::ReminderPreferences;
use crate::queue::{EntryKey, NotificationQueue, QueueEntry};
use crate::reminders::{ReminderCalculator, ReminderType, ScheduledReminder};
use crate::store::TaskStore;
use crate::task::{TaskId, TaskReminderRecord};

/// Reminder state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    NoAlarm,
    Scheduled { time: DateTime<Utc>, kind: ReminderType },
}

pub struct ReminderScheduler<S: TaskStore, C: Clock> {
    store: S,
    clock: C,
    calculator: ReminderCalculator,
    queue: Arc<NotificationQueue>,
    rng: Mutex<StdRng>,
}

impl<S: TaskStore, C: Clock> ReminderScheduler<S, C> {
    pub fn new(store: S, clock: C, prefs: ReminderPreferences, queue: Arc<NotificationQueue>) -> Self {
        Self {
            store,
            clock,
            calculator: ReminderCalculator::new(prefs),
            queue,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the jitter source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn preferences(&self) -> &ReminderPreferences {
        self.calculator.preferences()
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recompute and reinstall the next reminder for `task_id`.
    ///
    /// Missing tasks and store failures leave the task without alarms.
    pub fn schedule_alarm(&self, task_id: TaskId) -> Option<ScheduledReminder> {
        self.schedule_alarm_after(task_id, None)
    }

    /// [`schedule_alarm`](Self::schedule_alarm) right after a dispatch pass
    /// that delivered everything up to `delivered_until`. User alarms at or
    /// before that instant were already handed out and are not queued again.
    pub fn schedule_alarm_after(
        &self,
        task_id: TaskId,
        delivered_until: Option<DateTime<Utc>>,
    ) -> Option<ScheduledReminder> {
        match self.store.fetch(task_id) {
            Ok(Some(task)) => {
                let now = self.clock.now();
                self.schedule_task_at(&task, now, delivered_until, None)
            }
            Ok(None) => {
                debug!("task {task_id} not found, clearing its alarms");
                self.clear_all_alarms(task_id);
                None
            }
            Err(e) => {
                error!("cannot load task {task_id} for scheduling: {e}");
                None
            }
        }
    }

    /// Same as [`schedule_alarm`](Self::schedule_alarm) for a snapshot the caller already has.
    pub fn schedule_task(&self, task: &TaskReminderRecord) -> Option<ScheduledReminder> {
        let now = self.clock.now();
        self.schedule_task_at(task, now, None, None)
    }

    fn schedule_task_at(
        &self,
        task: &TaskReminderRecord,
        now: DateTime<Utc>,
        delivered_until: Option<DateTime<Utc>>,
        stagger: Option<&mut DateTime<Utc>>,
    ) -> Option<ScheduledReminder> {
        self.clear_all_alarms(task.id);

        if !task.is_active() || !self.preferences().enabled {
            return None;
        }

        let alarm_floor = delivered_until.map_or(now, |d| d.max(now));
        for alarm in task.alarms.iter().filter(|a| a.time > alarm_floor) {
            self.queue.add(QueueEntry::alarm(alarm.id, task.id, alarm.time));
        }

        let next = {
            let mut rng = self.rng();
            self.calculator.next_reminder(task, now, stagger, &mut *rng)
        };

        if let Some(r) = next {
            debug!("task {} next {} reminder at {}", task.id, r.kind, r.time);
            self.queue.add(r.into());
        }
        next
    }

    /// Remove every pending reminder and alarm of `task_id`.
    pub fn clear_all_alarms(&self, task_id: TaskId) {
        self.queue.cancel_reminder(task_id);
        self.queue.cancel_task_alarms(task_id);
    }

    /// Full rescan of every reminder-eligible task. Returns how many tasks
    /// ended up with something queued.
    pub fn schedule_all_alarms(&self) -> usize {
        self.queue.clear();

        if !self.preferences().enabled {
            info!("reminders disabled, notification queue cleared");
            return 0;
        }

        let tasks = match self.store.reminder_candidates() {
            Ok(t) => t,
            Err(e) => {
                error!("cannot load tasks for reminder rescan: {e}");
                return 0;
            }
        };

        let now = self.clock.now();
        let mut batch_now = now;
        let mut scheduled = 0usize;

        for task in &tasks {
            let reminder = self.schedule_task_at(task, now, None, Some(&mut batch_now));
            let has_alarm = task.alarms.iter().any(|a| a.time > now);
            if reminder.is_some() || has_alarm {
                scheduled += 1;
            }
        }

        if let Err(e) = self.queue.schedule_next() {
            warn!("cannot register notification wake-up after rescan: {e}");
        }

        info!("rescanned {} tasks, {} with pending reminders", tasks.len(), scheduled);
        scheduled
    }

    /// Snooze `task_id` until `until` and reschedule it.
    pub fn snooze(&self, task_id: TaskId, until: DateTime<Utc>) -> Option<ScheduledReminder> {
        let mut task = match self.store.fetch(task_id) {
            Ok(Some(t)) => t,
            Ok(None) => {
                warn!("cannot snooze missing task {task_id}");
                return None;
            }
            Err(e) => {
                error!("cannot load task {task_id} for snooze: {e}");
                return None;
            }
        };
        task.reminder_snooze = Some(until);
        if let Err(e) = self.store.save(&task) {
            error!("cannot save snooze for task {task_id}: {e}");
            return None;
        }
        self.schedule_task(&task)
    }

    pub fn alarm_state(&self, task_id: TaskId) -> AlarmState {
        match self.queue.get(EntryKey::Reminder(task_id)) {
            Some(entry) => AlarmState::Scheduled {
                time: entry.time(),
                kind: entry.kind(),
            },
            None => AlarmState::NoAlarm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryTaskStore;
    use crate::task::{DueDate, ReminderFlags};
    use crate::wake::RecordingWakeScheduler;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 14, 9, 0, 0).unwrap()
    }

    fn build(
        tasks: Vec<TaskReminderRecord>,
        prefs: ReminderPreferences,
    ) -> ReminderScheduler<Arc<MemoryTaskStore>, Arc<FixedClock>> {
        let wake = Arc::new(RecordingWakeScheduler::new());
        let queue = Arc::new(NotificationQueue::new(prefs.clone(), wake));
        ReminderScheduler::new(
            Arc::new(MemoryTaskStore::with_tasks(tasks)),
            Arc::new(FixedClock::new(now())),
            prefs,
            queue,
        )
        .with_rng(StdRng::seed_from_u64(42))
    }

    fn due_task(id: TaskId, due: DateTime<Utc>) -> TaskReminderRecord {
        TaskReminderRecord::new(id, format!("task {id}"), now() - Duration::days(1))
            .with_due(DueDate::Timed(due))
            .with_flags(ReminderFlags::AT_DEADLINE)
    }

    #[test]
    fn schedules_due_reminder() {
        let due = now() + Duration::hours(3);
        let s = build(vec![due_task(1, due)], ReminderPreferences::default());

        s.schedule_alarm(1);

        assert_eq!(s.alarm_state(1), AlarmState::Scheduled { time: due, kind: ReminderType::Due });
    }

    #[test]
    fn scheduling_twice_keeps_one_entry() {
        let due = now() + Duration::hours(3);
        let random = TaskReminderRecord::new(2, "random", now()).with_period(Duration::hours(4));
        let s = build(vec![due_task(1, due), random], ReminderPreferences::default());

        s.schedule_alarm(1);
        let first = s.queue().jobs();
        s.schedule_alarm(1);
        assert_eq!(s.queue().jobs(), first);

        s.schedule_alarm(2);
        s.schedule_alarm(2);
        assert_eq!(s.queue().len(), 2);
    }

    #[test]
    fn completed_task_loses_its_alarm() {
        let due = now() + Duration::hours(3);
        let s = build(vec![due_task(1, due)], ReminderPreferences::default());
        s.schedule_alarm(1);

        let mut t = s.store().fetch(1).unwrap().unwrap();
        t.completed_at = Some(now());
        s.store().save(&t).unwrap();
        s.schedule_alarm(1);

        assert_eq!(s.alarm_state(1), AlarmState::NoAlarm);
        assert!(s.queue().jobs().iter().all(|e| e.task_id() != 1));
    }

    #[test]
    fn deleted_task_alarms_are_cleared() {
        let due = now() + Duration::hours(3);
        let s = build(
            vec![due_task(1, due).with_alarm(10, now() + Duration::hours(1))],
            ReminderPreferences::default(),
        );
        s.schedule_alarm(1);
        assert_eq!(s.queue().len(), 2);

        s.store().remove(1);
        s.schedule_alarm(1);

        assert!(s.queue().is_empty());
    }

    #[test]
    fn only_future_user_alarms_are_queued() {
        let t = TaskReminderRecord::new(1, "alarms", now())
            .with_alarm(10, now() - Duration::minutes(5))
            .with_alarm(11, now() + Duration::minutes(5));
        let s = build(vec![t], ReminderPreferences::default());

        s.schedule_alarm(1);

        assert_eq!(s.queue().jobs(), vec![QueueEntry::alarm(11, 1, now() + Duration::minutes(5))]);
    }

    #[test]
    fn snooze_overrides_due() {
        let due = now() + Duration::hours(3);
        let s = build(vec![due_task(1, due)], ReminderPreferences::default());
        let until = now() + Duration::minutes(10);

        let r = s.snooze(1, until).unwrap();

        assert_eq!(r.kind, ReminderType::Snooze);
        assert_eq!(s.store().fetch(1).unwrap().unwrap().reminder_snooze, Some(until));
        assert_eq!(s.alarm_state(1), AlarmState::Scheduled { time: until, kind: ReminderType::Snooze });
    }

    #[test]
    fn rescan_staggers_overdue_tasks() {
        let overdue = |id| {
            TaskReminderRecord::new(id, "late", now() - Duration::days(2))
                .with_due(DueDate::Timed(now() - Duration::hours(5)))
                .with_flags(ReminderFlags::AFTER_DEADLINE)
        };
        let s = build(vec![overdue(1), overdue(2), overdue(3)], ReminderPreferences::default());

        assert_eq!(s.schedule_all_alarms(), 3);

        let times: Vec<_> = s.queue().jobs().iter().map(QueueEntry::time).collect();
        assert_eq!(
            times,
            vec![now(), now() + Duration::minutes(30), now() + Duration::minutes(60)]
        );
    }

    #[test]
    fn rescan_with_reminders_disabled_clears_queue() {
        let due = now() + Duration::hours(3);
        let mut prefs = ReminderPreferences::default();
        prefs.enabled = false;
        let s = build(vec![due_task(1, due)], prefs);
        s.queue().add(QueueEntry::reminder(1, due, ReminderType::Due));

        assert_eq!(s.schedule_all_alarms(), 0);
        assert!(s.queue().is_empty());
    }
}
