//! NotificationQueue: time-ordered pending reminders and alarms.
//!
//! Design:
//! - Entries are unique per [`EntryKey`]; adding an existing key replaces it.
//! - Ordered by `(time, key)`, so reminders sort before alarms at the same instant.
//! - Whenever the earliest pending time changes, the queue re-registers its
//!   own wake-up (adjusted for quiet hours) with the [`WakeScheduler`].
//! - Every mutation runs under one mutex; callers may be on any thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::WakeError;
use crate::preferences::ReminderPreferences;
use crate::reminders::{ReminderType, ScheduledReminder};
use crate::task::{AlarmId, TaskId};
use crate::wake::{WakeScheduler, NOTIFICATION_WAKE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKey {
    Reminder(TaskId),
    Alarm(AlarmId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum QueueEntry {
    Reminder {
        task_id: TaskId,
        time: DateTime<Utc>,
        kind: ReminderType,
    },
    Alarm {
        alarm_id: AlarmId,
        task_id: TaskId,
        time: DateTime<Utc>,
    },
}

impl QueueEntry {
    pub fn reminder(task_id: TaskId, time: DateTime<Utc>, kind: ReminderType) -> Self {
        QueueEntry::Reminder { task_id, time, kind }
    }

    pub fn alarm(alarm_id: AlarmId, task_id: TaskId, time: DateTime<Utc>) -> Self {
        QueueEntry::Alarm { alarm_id, task_id, time }
    }

    pub fn key(&self) -> EntryKey {
        match *self {
            QueueEntry::Reminder { task_id, .. } => EntryKey::Reminder(task_id),
            QueueEntry::Alarm { alarm_id, .. } => EntryKey::Alarm(alarm_id),
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match *self {
            QueueEntry::Reminder { time, .. } | QueueEntry::Alarm { time, .. } => time,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match *self {
            QueueEntry::Reminder { task_id, .. } | QueueEntry::Alarm { task_id, .. } => task_id,
        }
    }

    pub fn kind(&self) -> ReminderType {
        match *self {
            QueueEntry::Reminder { kind, .. } => kind,
            QueueEntry::Alarm { .. } => ReminderType::Alarm,
        }
    }
}

impl From<ScheduledReminder> for QueueEntry {
    fn from(r: ScheduledReminder) -> Self {
        QueueEntry::reminder(r.task_id, r.time, r.kind)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    by_time: BTreeMap<(DateTime<Utc>, EntryKey), QueueEntry>,
    by_key: HashMap<EntryKey, DateTime<Utc>>,
}

impl QueueState {
    fn earliest(&self) -> Option<DateTime<Utc>> {
        self.by_time.keys().next().map(|(t, _)| *t)
    }

    fn insert(&mut self, entry: QueueEntry) {
        let key = entry.key();
        self.take(key);
        self.by_key.insert(key, entry.time());
        self.by_time.insert((entry.time(), key), entry);
    }

    fn take(&mut self, key: EntryKey) -> Option<QueueEntry> {
        let time = self.by_key.remove(&key)?;
        self.by_time.remove(&(time, key))
    }
}

pub struct NotificationQueue {
    state: Mutex<QueueState>,
    prefs: ReminderPreferences,
    wake: Arc<dyn WakeScheduler>,
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("len", &self.len())
            .field("prefs", &self.prefs)
            .finish()
    }
}

impl NotificationQueue {
    pub fn new(prefs: ReminderPreferences, wake: Arc<dyn WakeScheduler>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            prefs,
            wake,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert `entry`, replacing any entry with the same key.
    ///
    /// Returns `true` when the queue's wake-up was re-registered.
    pub fn add(&self, entry: QueueEntry) -> bool {
        let mut state = self.lock();
        let before = state.earliest();
        state.insert(entry);
        self.reschedule_if_changed(&state, before)
    }

    pub fn cancel(&self, key: EntryKey) -> bool {
        let mut state = self.lock();
        let before = state.earliest();
        if state.take(key).is_none() {
            return false;
        }
        self.reschedule_if_changed(&state, before)
    }

    pub fn cancel_reminder(&self, task_id: TaskId) -> bool {
        self.cancel(EntryKey::Reminder(task_id))
    }

    pub fn cancel_alarm(&self, alarm_id: AlarmId) -> bool {
        self.cancel(EntryKey::Alarm(alarm_id))
    }

    /// Drop every alarm entry belonging to `task_id`.
    pub fn cancel_task_alarms(&self, task_id: TaskId) -> bool {
        let mut state = self.lock();
        let before = state.earliest();
        let keys: Vec<EntryKey> = state
            .by_time
            .values()
            .filter(|e| matches!(e, QueueEntry::Alarm { task_id: t, .. } if *t == task_id))
            .map(QueueEntry::key)
            .collect();
        if keys.is_empty() {
            return false;
        }
        for key in keys {
            state.take(key);
        }
        self.reschedule_if_changed(&state, before)
    }

    /// Remove exactly these entries (key and time must match). Does not
    /// touch the wake-up; the dispatcher reschedules after a run.
    ///
    /// Returns `true` if every entry was found.
    pub fn remove(&self, entries: &[QueueEntry]) -> bool {
        let mut state = self.lock();
        let mut all = true;
        for entry in entries {
            let key = entry.key();
            match state.by_key.get(&key) {
                Some(t) if *t == entry.time() => {
                    state.take(key);
                }
                _ => all = false,
            }
        }
        all
    }

    /// Entries with `time <= cutoff`, in queue order, without removing them.
    pub fn due_by(&self, cutoff: DateTime<Utc>) -> Vec<QueueEntry> {
        self.lock()
            .by_time
            .iter()
            .take_while(|((t, _), _)| *t <= cutoff)
            .map(|(_, e)| *e)
            .collect()
    }

    /// Atomically remove and return every entry with `time <= cutoff`.
    pub fn pop_due_by(&self, cutoff: DateTime<Utc>) -> Vec<QueueEntry> {
        let mut state = self.lock();
        let due: Vec<QueueEntry> = state
            .by_time
            .iter()
            .take_while(|((t, _), _)| *t <= cutoff)
            .map(|(_, e)| *e)
            .collect();
        for entry in &due {
            state.take(entry.key());
        }
        due
    }

    /// Drop everything and cancel the queue's wake-up.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.by_time.clear();
        state.by_key.clear();
        if let Err(e) = self.wake.cancel_wake(NOTIFICATION_WAKE) {
            warn!("cannot cancel notification wake-up: {e}");
        }
    }

    /// Earliest logical time in the queue.
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.lock().earliest()
    }

    /// When the platform should wake us: the earliest time, pushed past quiet hours.
    pub fn next_scheduled_time(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .earliest()
            .map(|t| self.prefs.adjust_for_quiet_hours(t))
    }

    /// Register (or cancel, when empty) the queue's wake-up.
    pub fn schedule_next(&self) -> Result<Option<DateTime<Utc>>, WakeError> {
        let state = self.lock();
        self.push_wake(&state, None)
    }

    /// Like [`schedule_next`](Self::schedule_next), but never earlier than
    /// `now`, so overdue entries held back by quiet hours wait for the window
    /// to close instead of waking us immediately.
    pub fn schedule_next_after(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, WakeError> {
        let state = self.lock();
        self.push_wake(&state, Some(now))
    }

    pub fn jobs(&self) -> Vec<QueueEntry> {
        self.lock().by_time.values().copied().collect()
    }

    pub fn get(&self, key: EntryKey) -> Option<QueueEntry> {
        let state = self.lock();
        let time = *state.by_key.get(&key)?;
        state.by_time.get(&(time, key)).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reschedule_if_changed(&self, state: &QueueState, before: Option<DateTime<Utc>>) -> bool {
        if state.earliest() == before {
            return false;
        }
        if let Err(e) = self.push_wake(state, None) {
            warn!("cannot register notification wake-up: {e}");
        }
        true
    }

    fn push_wake(
        &self,
        state: &QueueState,
        floor: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, WakeError> {
        match state.earliest() {
            Some(t) => {
                let at = self.prefs.adjust_for_quiet_hours(floor.map_or(t, |f| t.max(f)));
                debug!("next notification wake-up at {at} (earliest entry {t})");
                self.wake.schedule_wake(at, NOTIFICATION_WAKE)?;
                Ok(Some(at))
            }
            None => {
                debug!("notification queue empty, cancelling wake-up");
                self.wake.cancel_wake(NOTIFICATION_WAKE)?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiet_hours::QuietHours;
    use crate::reminders::ReminderType::{Due, Snooze};
    use crate::wake::{RecordingWakeScheduler, WakeCall};
    use chrono::{Duration, NaiveTime, TimeZone};

    const ONE_MINUTE: Duration = Duration::minutes(1);

    fn setup() -> (NotificationQueue, Arc<RecordingWakeScheduler>) {
        setup_with(ReminderPreferences::default())
    }

    fn setup_with(prefs: ReminderPreferences) -> (NotificationQueue, Arc<RecordingWakeScheduler>) {
        let wake = Arc::new(RecordingWakeScheduler::new());
        (NotificationQueue::new(prefs, wake.clone()), wake)
    }

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn sched(at: DateTime<Utc>) -> WakeCall {
        WakeCall::Schedule(NOTIFICATION_WAKE, at)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn alarm_and_reminder_same_time_same_id() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, now(), Due));
        queue.add(QueueEntry::alarm(1, 1, now()));

        assert_eq!(wake.calls(), vec![sched(now())]);
        assert_eq!(
            queue.due_by(now()),
            vec![QueueEntry::reminder(1, now(), Due), QueueEntry::alarm(1, 1, now())]
        );
    }

    #[test]
    fn remove_alarm_leave_reminder() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, now(), Due));
        queue.add(QueueEntry::alarm(1, 1, now()));

        assert!(queue.remove(&[QueueEntry::alarm(1, 1, now())]));

        assert_eq!(wake.calls(), vec![sched(now())]);
        assert_eq!(queue.due_by(now()), vec![QueueEntry::reminder(1, now(), Due)]);
    }

    #[test]
    fn remove_ignores_stale_time() {
        let (queue, _wake) = setup();
        queue.add(QueueEntry::reminder(1, now(), Due));
        assert!(!queue.remove(&[QueueEntry::reminder(1, now() + ONE_MINUTE, Due)]));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn two_jobs_at_same_time() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, t(1), Due));
        queue.add(QueueEntry::reminder(2, t(1), Due));
        assert_eq!(wake.calls(), vec![sched(t(1))]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn dont_reschedule_for_later_jobs() {
        let (queue, wake) = setup();
        assert!(queue.add(QueueEntry::reminder(1, t(1), Due)));
        assert!(!queue.add(QueueEntry::reminder(2, t(2), Due)));
        assert_eq!(wake.calls(), vec![sched(t(1))]);
    }

    #[test]
    fn same_key_replaces_and_reschedules_earlier() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, t(2), Due));
        queue.add(QueueEntry::reminder(1, t(1), Snooze));
        assert_eq!(wake.calls(), vec![sched(t(2)), sched(t(1))]);
        assert_eq!(queue.jobs(), vec![QueueEntry::reminder(1, t(1), Snooze)]);
    }

    #[test]
    fn cancel_only_job_cancels_wake() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, t(2), Due));
        assert!(queue.cancel_reminder(1));
        assert_eq!(wake.calls(), vec![sched(t(2)), WakeCall::Cancel(NOTIFICATION_WAKE)]);
    }

    #[test]
    fn cancel_first_job_moves_wake() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, t(1), Due));
        queue.add(QueueEntry::reminder(2, t(2), Due));
        queue.cancel_reminder(1);
        assert_eq!(wake.calls(), vec![sched(t(1)), sched(t(2))]);
    }

    #[test]
    fn cancel_later_job_keeps_wake() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, t(1), Due));
        queue.add(QueueEntry::reminder(2, t(2), Due));
        assert!(!queue.cancel_reminder(2));
        assert_eq!(wake.calls(), vec![sched(t(1))]);
    }

    #[test]
    fn ignore_invalid_cancel() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, now(), Due));
        assert!(!queue.cancel_reminder(2));
        assert_eq!(wake.calls(), vec![sched(now())]);
    }

    #[test]
    fn add_then_cancel_restores_state() {
        let (queue, _wake) = setup();
        queue.add(QueueEntry::reminder(1, t(5), Due));
        queue.add(QueueEntry::reminder(2, t(9), Due));
        let (len, earliest) = (queue.len(), queue.earliest());

        let entry = QueueEntry::reminder(3, t(1), Due);
        queue.add(entry);
        queue.cancel(entry.key());

        assert_eq!(queue.len(), len);
        assert_eq!(queue.earliest(), earliest);
    }

    #[test]
    fn empty_queue_has_no_next_time() {
        let (queue, _wake) = setup();
        assert_eq!(queue.next_scheduled_time(), None);
    }

    #[test]
    fn wake_up_is_adjusted_for_quiet_hours() {
        let quiet = QuietHours::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        );
        let (queue, wake) = setup_with(ReminderPreferences::default().with_quiet_hours(quiet));
        let late = Utc.with_ymd_and_hms(2026, 6, 1, 23, 30, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2026, 6, 2, 8, 0, 0).unwrap();

        queue.add(QueueEntry::reminder(1, late, Due));

        assert_eq!(wake.calls(), vec![sched(morning)]);
        assert_eq!(queue.next_scheduled_time(), Some(morning));
        assert_eq!(queue.jobs()[0].time(), late);
    }

    #[test]
    fn overdue_entry_waits_for_quiet_hours_to_end() {
        let quiet = QuietHours::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        );
        let (queue, wake) = setup_with(ReminderPreferences::default().with_quiet_hours(quiet));
        let evening = Utc.with_ymd_and_hms(2026, 6, 1, 21, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2026, 6, 2, 0, 0, 0).unwrap();
        queue.add(QueueEntry::reminder(1, evening, Due));

        let at = queue.schedule_next_after(midnight).unwrap();

        let morning = Utc.with_ymd_and_hms(2026, 6, 2, 8, 0, 0).unwrap();
        assert_eq!(at, Some(morning));
        assert_eq!(wake.pending(NOTIFICATION_WAKE), Some(morning));
    }

    #[test]
    fn pop_due_by_splits_at_cutoff() {
        let (queue, _wake) = setup();
        queue.add(QueueEntry::reminder(1, now(), Due));
        queue.add(QueueEntry::reminder(2, now() + ONE_MINUTE, Due));
        queue.add(QueueEntry::reminder(3, now() + ONE_MINUTE * 2, Due));

        let popped = queue.pop_due_by(now() + ONE_MINUTE);

        assert_eq!(
            popped,
            vec![
                QueueEntry::reminder(1, now(), Due),
                QueueEntry::reminder(2, now() + ONE_MINUTE, Due)
            ]
        );
        assert_eq!(queue.jobs(), vec![QueueEntry::reminder(3, now() + ONE_MINUTE * 2, Due)]);
    }

    #[test]
    fn overdue_jobs_are_removed() {
        let (queue, _wake) = setup();
        queue.add(QueueEntry::reminder(1, now(), Due));
        queue.add(QueueEntry::reminder(2, now() + ONE_MINUTE, Due));

        let overdue = queue.due_by(now());
        queue.remove(&overdue);

        assert_eq!(queue.jobs(), vec![QueueEntry::reminder(2, now() + ONE_MINUTE, Due)]);
    }

    #[test]
    fn clear_cancels_existing() {
        let (queue, wake) = setup();
        queue.add(QueueEntry::reminder(1, t(1), Due));
        queue.clear();
        assert_eq!(wake.calls(), vec![sched(t(1)), WakeCall::Cancel(NOTIFICATION_WAKE)]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn cancel_task_alarms_leaves_reminder() {
        let (queue, _wake) = setup();
        queue.add(QueueEntry::reminder(1, t(10), Due));
        queue.add(QueueEntry::alarm(100, 1, t(5)));
        queue.add(QueueEntry::alarm(101, 1, t(6)));
        queue.add(QueueEntry::alarm(200, 2, t(7)));

        assert!(queue.cancel_task_alarms(1));

        assert_eq!(
            queue.jobs(),
            vec![QueueEntry::alarm(200, 2, t(7)), QueueEntry::reminder(1, t(10), Due)]
        );
    }

    #[test]
    fn wake_failure_does_not_lose_entries() {
        let (queue, wake) = setup();
        wake.reject_with(Some("permission revoked"));
        assert!(queue.add(QueueEntry::reminder(1, t(1), Due)));
        assert_eq!(queue.len(), 1);
        assert!(queue.schedule_next().is_err());
        wake.reject_with(None);
        assert_eq!(queue.schedule_next().unwrap(), Some(t(1)));
    }

    #[test]
    fn concurrent_adds_keep_one_entry_per_key() {
        let (queue, _wake) = setup();
        let queue = Arc::new(queue);
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let q = queue.clone();
                std::thread::spawn(move || {
                    for id in 0..50 {
                        q.add(QueueEntry::reminder(id, t(1000 + n), Due));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.jobs().len(), 50);
    }
}
