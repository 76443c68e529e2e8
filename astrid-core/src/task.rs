//! Reminder-relevant projection of a task.
//!
//! Storage owns the full task; the reminder engine only ever reads this
//! snapshot (and writes back `reminder_last` / `reminder_snooze`).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type AlarmId = i64;

/// Reminder flag bitset, stored as a plain integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderFlags(u32);

impl ReminderFlags {
    pub const NONE: Self = Self(0);
    /// Remind when the task is due.
    pub const AT_DEADLINE: Self = Self(1 << 1);
    /// Keep reminding once the task is overdue.
    pub const AFTER_DEADLINE: Self = Self(1 << 2);
    /// Ring until dismissed.
    pub const MODE_NONSTOP: Self = Self(1 << 3);
    /// Ring five times.
    pub const MODE_FIVE: Self = Self(1 << 4);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ReminderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ReminderFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Due date, either a whole day or a specific instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DueDate {
    AllDay(NaiveDate),
    Timed(DateTime<Utc>),
}

impl DueDate {
    pub fn has_due_time(&self) -> bool {
        matches!(self, DueDate::Timed(_))
    }
}

/// User-defined absolute alarm attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAlarm {
    pub id: AlarmId,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReminderRecord {
    pub id: TaskId,
    pub title: String,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub due: Option<DueDate>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hide_until: Option<DateTime<Utc>>,

    #[serde(default)]
    pub reminder_flags: ReminderFlags,
    /// Milliseconds between random reminders. Zero or negative disables them.
    #[serde(default)]
    pub reminder_period_ms: i64,
    #[serde(default)]
    pub reminder_last: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_snooze: Option<DateTime<Utc>>,

    /// 0 (most important) to 3 (none).
    #[serde(default = "default_importance")]
    pub importance: i32,

    #[serde(default)]
    pub alarms: Vec<TaskAlarm>,
}

fn default_importance() -> i32 {
    2
}

impl TaskReminderRecord {
    pub fn new(id: TaskId, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            created_at,
            due: None,
            completed_at: None,
            deleted_at: None,
            hide_until: None,
            reminder_flags: ReminderFlags::NONE,
            reminder_period_ms: 0,
            reminder_last: None,
            reminder_snooze: None,
            importance: default_importance(),
            alarms: Vec::new(),
        }
    }

    pub fn with_due(mut self, due: DueDate) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_flags(mut self, flags: ReminderFlags) -> Self {
        self.reminder_flags = flags;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.reminder_period_ms = period.num_milliseconds();
        self
    }

    pub fn with_last_reminder(mut self, at: DateTime<Utc>) -> Self {
        self.reminder_last = Some(at);
        self
    }

    pub fn with_snooze(mut self, until: DateTime<Utc>) -> Self {
        self.reminder_snooze = Some(until);
        self
    }

    pub fn with_importance(mut self, importance: i32) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_alarm(mut self, id: AlarmId, time: DateTime<Utc>) -> Self {
        self.alarms.push(TaskAlarm { id, time });
        self
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        !self.is_completed() && !self.is_deleted()
    }

    pub fn is_hidden(&self, now: DateTime<Utc>) -> bool {
        self.hide_until.is_some_and(|h| h > now)
    }

    /// Random reminder period, `None` when disabled or malformed.
    pub fn reminder_period(&self) -> Option<Duration> {
        if self.reminder_period_ms <= 0 {
            return None;
        }
        Duration::try_milliseconds(self.reminder_period_ms)
    }

    /// Whether a full rescan should consider this task at all.
    pub fn wants_reminders(&self) -> bool {
        self.is_active()
            && (!self.reminder_flags.is_empty()
                || self.reminder_period().is_some()
                || self.reminder_snooze.is_some()
                || !self.alarms.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn negative_period_is_disabled() {
        let t = TaskReminderRecord::new(1, "t", Utc::now()).with_period(Duration::milliseconds(-5));
        assert_eq!(t.reminder_period(), None);
    }

    #[test]
    fn flags_combine() {
        let f = ReminderFlags::AT_DEADLINE | ReminderFlags::MODE_FIVE;
        assert!(f.contains(ReminderFlags::AT_DEADLINE));
        assert!(!f.contains(ReminderFlags::AFTER_DEADLINE));
        assert_eq!(f.bits(), 0b10010);
    }

    #[test]
    fn record_deserializes_with_missing_optionals() {
        let json = r#"{"id":7,"title":"x","created_at":"2026-01-01T00:00:00Z"}"#;
        let t: TaskReminderRecord = serde_json::from_str(json).unwrap();
        assert_eq!(t.id, 7);
        assert!(t.due.is_none());
        assert!(t.reminder_flags.is_empty());
        assert_eq!(t.created_at, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }
}
