//! Time utilities: timezone-aware time-of-day transforms on immutable instants.

use anyhow::Result;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

pub const ONE_MINUTE: Duration = Duration::minutes(1);
pub const ONE_HOUR: Duration = Duration::hours(1);
pub const ONE_DAY: Duration = Duration::days(1);

/// Parse a deadline like "2026-02-20 23:59" in an IANA tz like "America/Chicago",
/// returning UTC.
pub fn parse_local_deadline_to_utc(local: &str, tz: &str) -> Result<DateTime<Utc>> {
    let tz: Tz = tz
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))?;

    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M")
        .map_err(|e| anyhow::anyhow!("invalid local datetime '{local}': {e}"))?;

    Ok(local_to_utc(tz, ndt))
}

/// Parse "HH:MM" into a time of day.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("invalid time of day '{s}': {e}"))
}

/// Resolve a wall-clock time in `tz` to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier mapping. Times inside a
/// DST gap move forward by one hour.
pub fn local_to_utc(tz: Tz, ndt: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&ndt) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(early, _) => early.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = ndt + ONE_HOUR;
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                LocalResult::None => Utc.from_utc_datetime(&ndt),
            }
        }
    }
}

/// Same local day as `instant`, with the wall-clock time replaced by `time`.
pub fn with_time_of_day(instant: DateTime<Utc>, tz: Tz, time: NaiveTime) -> DateTime<Utc> {
    let day = instant.with_timezone(&tz).date_naive();
    at_time_of_day(day, tz, time)
}

/// `day` at wall-clock `time` in `tz`.
pub fn at_time_of_day(day: NaiveDate, tz: Tz, time: NaiveTime) -> DateTime<Utc> {
    local_to_utc(tz, day.and_time(time))
}

/// 23:59:59 local on the day of `instant`.
pub fn end_of_day(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    with_time_of_day(instant, tz, last_second_of_day())
}

pub fn last_second_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// Truncate to the start of the minute containing `instant`.
pub fn start_of_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

/// Last millisecond of the minute containing `instant`.
pub fn end_of_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    start_of_minute(instant) + ONE_MINUTE - Duration::milliseconds(1)
}
