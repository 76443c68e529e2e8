//! Reminder calculator: maps a task snapshot plus "now" to its next reminder.
//!
//! Up to four candidates are computed (snooze, random, due, overdue) and one
//! is picked. `None` stands for "no alarm" and sorts after every instant.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::preferences::ReminderPreferences;
use crate::task::{DueDate, ReminderFlags, TaskId, TaskReminderRecord};
use crate::time::{at_time_of_day, last_second_of_day, ONE_DAY, ONE_HOUR};

/// How far apart bulk-scheduled overdue reminders are spread.
pub const BULK_STAGGER: Duration = Duration::minutes(30);

/// A recent reminder inside this window backs off overdue reminders.
const RECENT_REMINDER_WINDOW: Duration = Duration::hours(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Due,
    Overdue,
    Random,
    Snooze,
    Alarm,
}

impl ReminderType {
    /// Stable integer code, matching the historical alarm type values.
    pub fn code(self) -> i32 {
        match self {
            ReminderType::Due => 0,
            ReminderType::Overdue => 1,
            ReminderType::Random => 2,
            ReminderType::Snooze => 3,
            ReminderType::Alarm => 4,
        }
    }
}

impl std::fmt::Display for ReminderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReminderType::Due => "due",
            ReminderType::Overdue => "overdue",
            ReminderType::Random => "random",
            ReminderType::Snooze => "snooze",
            ReminderType::Alarm => "alarm",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReminder {
    pub task_id: TaskId,
    pub time: DateTime<Utc>,
    pub kind: ReminderType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderCandidates {
    pub snooze: Option<DateTime<Utc>>,
    pub random: Option<DateTime<Utc>>,
    pub due: Option<DateTime<Utc>>,
    pub overdue: Option<DateTime<Utc>>,
}

/// Draw a factor uniformly from `[lo, hi)`, or the midpoint when randomization is off.
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, randomize: bool, lo: f64, hi: f64) -> f64 {
    if !randomize || hi <= lo {
        return (lo + hi) / 2.0;
    }
    lo + (hi - lo) * rng.r#gen::<f64>()
}

fn hours(h: f64) -> Option<Duration> {
    Duration::try_milliseconds((h * ONE_HOUR.num_milliseconds() as f64) as i64)
}

fn scale(d: Duration, factor: f64) -> Option<Duration> {
    Duration::try_milliseconds((d.num_milliseconds() as f64 * factor) as i64)
}

/// `at + offset`, `None` when it leaves the representable range.
fn shift(at: DateTime<Utc>, offset: Option<Duration>) -> Option<DateTime<Utc>> {
    at.checked_add_signed(offset?)
}

/// `a` strictly earlier than `b`, with `None` as "never".
fn earlier(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[derive(Debug, Clone)]
pub struct ReminderCalculator {
    prefs: ReminderPreferences,
}

impl ReminderCalculator {
    pub fn new(prefs: ReminderPreferences) -> Self {
        Self { prefs }
    }

    pub fn preferences(&self) -> &ReminderPreferences {
        &self.prefs
    }

    /// A snooze counts only while it is still ahead of us.
    pub fn snooze_candidate(&self, task: &TaskReminderRecord, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        task.reminder_snooze.filter(|s| *s > now)
    }

    /// Roughly one period after the last reminder (or creation). Late
    /// candidates are pulled into the next few hours. A period too large to
    /// land on a representable instant yields no candidate.
    pub fn random_candidate<R: Rng + ?Sized>(
        &self,
        task: &TaskReminderRecord,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<DateTime<Utc>> {
        let period = task.reminder_period()?;
        let last = task.reminder_last.unwrap_or(task.created_at);
        let when = shift(last, scale(period, jitter(rng, self.prefs.randomize, 0.85, 1.15)))?;
        if when < now {
            return shift(now, hours(jitter(rng, self.prefs.randomize, 0.5, 6.5)));
        }
        Some(when)
    }

    /// The due instant (or the default reminder time on an all-day due date),
    /// provided we have not already reminded at or after it. May be in the past.
    pub fn due_candidate(&self, task: &TaskReminderRecord) -> Option<DateTime<Utc>> {
        if !task.reminder_flags.contains(ReminderFlags::AT_DEADLINE) {
            return None;
        }
        let alarm = match task.due? {
            DueDate::Timed(at) => at,
            DueDate::AllDay(day) => at_time_of_day(day, self.prefs.timezone, self.prefs.default_time),
        };
        match task.reminder_last {
            Some(last) if last >= alarm => None,
            _ => Some(alarm),
        }
    }

    /// Reminder after the due instant passed. All-day tasks become overdue at
    /// the end of their day.
    pub fn overdue_candidate<R: Rng + ?Sized>(
        &self,
        task: &TaskReminderRecord,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<DateTime<Utc>> {
        if !task.reminder_flags.contains(ReminderFlags::AFTER_DEADLINE) {
            return None;
        }
        let due = match task.due? {
            DueDate::Timed(at) => at,
            DueDate::AllDay(day) => at_time_of_day(day, self.prefs.timezone, last_second_of_day()),
        };

        if due > now {
            return shift(due, hours(jitter(rng, self.prefs.randomize, 0.5, 2.5)));
        }

        let Some(last) = task.reminder_last.filter(|l| *l >= due) else {
            return Some(now);
        };

        if now - last < RECENT_REMINDER_WINDOW {
            let importance = f64::from(task.importance.max(0));
            let backoff = jitter(rng, self.prefs.randomize, 2.0 + importance, 8.0 + importance);
            return shift(now, hours(backoff));
        }

        Some(now)
    }

    pub fn candidates<R: Rng + ?Sized>(
        &self,
        task: &TaskReminderRecord,
        now: DateTime<Utc>,
        overdue_now: DateTime<Utc>,
        rng: &mut R,
    ) -> ReminderCandidates {
        ReminderCandidates {
            snooze: self.snooze_candidate(task, now),
            random: self.random_candidate(task, now, rng),
            due: self.due_candidate(task),
            overdue: self.overdue_candidate(task, overdue_now, rng),
        }
    }

    /// Next reminder for `task`, or `None`.
    ///
    /// `stagger` is the running batch clock during a full rescan. Tasks whose
    /// due or overdue reminder is already at or before it are pinned to it,
    /// and the batch clock moves forward by [`BULK_STAGGER`].
    pub fn next_reminder<R: Rng + ?Sized>(
        &self,
        task: &TaskReminderRecord,
        now: DateTime<Utc>,
        stagger: Option<&mut DateTime<Utc>>,
        rng: &mut R,
    ) -> Option<ScheduledReminder> {
        if !task.is_active() {
            return None;
        }

        let overdue_now = stagger.as_deref().copied().unwrap_or(now);
        let mut c = self.candidates(task, now, overdue_now, rng);

        if let Some(batch) = stagger {
            let pinned = c.due.is_some_and(|d| d <= *batch) || c.overdue.is_some_and(|o| o <= *batch);
            if pinned {
                c.due = Some(*batch);
                c.overdue = Some(*batch);
                *batch += BULK_STAGGER;
            }
        }

        Self::select(task.id, c)
    }

    /// Pick one candidate: snooze, then random, then due, then overdue.
    ///
    /// A random reminder landing within a day before the due reminder is
    /// dropped in favour of the due reminder.
    pub fn select(task_id: TaskId, mut c: ReminderCandidates) -> Option<ScheduledReminder> {
        if let (Some(random), Some(due)) = (c.random, c.due) {
            if due - random < ONE_DAY {
                c.random = None;
            }
        }

        let (time, kind) = if let Some(snooze) = c.snooze {
            (snooze, ReminderType::Snooze)
        } else if earlier(c.random, c.due) && earlier(c.random, c.overdue) {
            (c.random?, ReminderType::Random)
        } else if earlier(c.due, c.overdue) {
            (c.due?, ReminderType::Due)
        } else {
            (c.overdue?, ReminderType::Overdue)
        };

        Some(ScheduledReminder { task_id, time, kind })
    }
}
