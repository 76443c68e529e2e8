//! Global reminder preferences consumed by the calculator, queue and dispatcher.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::quiet_hours::QuietHours;

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderPreferences {
    /// Master switch. When off, a full rescan empties the queue.
    pub enabled: bool,
    /// Zone used for every time-of-day computation.
    pub timezone: Tz,
    /// Reminder time for due dates without a time of day.
    pub default_time: NaiveTime,
    /// When off, every jitter draw collapses to the middle of its range.
    pub randomize: bool,
    pub quiet_hours: Option<QuietHours>,
}

impl Default for ReminderPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: Tz::UTC,
            default_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            randomize: true,
            quiet_hours: None,
        }
    }
}

impl ReminderPreferences {
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.timezone = tz;
        self
    }

    pub fn with_default_time(mut self, time: NaiveTime) -> Self {
        self.default_time = time;
        self
    }

    pub fn with_quiet_hours(mut self, quiet: QuietHours) -> Self {
        self.quiet_hours = Some(quiet);
        self
    }

    pub fn without_randomization(mut self) -> Self {
        self.randomize = false;
        self
    }

    /// Push `time` past quiet hours, if any are configured.
    pub fn adjust_for_quiet_hours(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        match &self.quiet_hours {
            Some(q) => q.adjust(time, self.timezone),
            None => time,
        }
    }
}
