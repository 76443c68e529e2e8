//! Quiet hours: a daily `[start, end)` window, possibly wrapping midnight,
//! during which the engine must not wake up.
//!
//! Only the wake-up time is moved. Queue entries keep their logical times so
//! a deferred reminder is still delivered once the window closes.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::time::{at_time_of_day, ONE_DAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `time` falls inside the window. `start == end` is an empty window.
    pub fn contains(&self, time: DateTime<Utc>, tz: Tz) -> bool {
        let tod = time.with_timezone(&tz).time();
        if self.wraps_midnight() {
            tod >= self.start || tod < self.end
        } else {
            tod >= self.start && tod < self.end
        }
    }

    /// Earliest instant at or after `time` that is outside the window.
    pub fn adjust(&self, time: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        if !self.contains(time, tz) {
            return time;
        }
        let local = time.with_timezone(&tz);
        let day = local.date_naive();
        let tod = local.time();
        // Past start on a wrapping window: the window closes tomorrow.
        if self.wraps_midnight() && tod >= self.start {
            let next = day.succ_opt().unwrap_or(day);
            return at_time_of_day(next, tz, self.end);
        }
        let end = at_time_of_day(day, tz, self.end);
        if end > time { end } else { end + ONE_DAY }
    }
}
