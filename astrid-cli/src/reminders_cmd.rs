use anyhow::{Context, Result, bail};
use astrid_core::time::parse_local_deadline_to_utc;
use astrid_core::{
    AlarmState, DueDate, QueueEntry, ReminderFlags, TaskId, TaskReminderRecord, TaskStore,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Subcommand, ValueEnum};

use crate::app::App;

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a task and schedule its reminders
    Add {
        title: String,

        /// Due date: "YYYY-MM-DD" (all day) or "YYYY-MM-DD HH:MM" (local time)
        #[arg(long)]
        due: Option<String>,

        /// Remind when the task is due
        #[arg(long, default_value_t = false)]
        at_deadline: bool,

        /// Keep reminding while the task is overdue
        #[arg(long, default_value_t = false)]
        overdue: bool,

        /// Random reminder roughly every N hours
        #[arg(long)]
        every_hours: Option<f64>,

        #[arg(long, value_enum, default_value_t = Ring::Once)]
        ring: Ring,

        /// 0 (highest) to 3 (none)
        #[arg(long, default_value_t = 2)]
        importance: i32,

        /// Hide until "YYYY-MM-DD HH:MM" (local time)
        #[arg(long)]
        hide_until: Option<String>,
    },

    /// List tasks with their next reminder
    List {
        /// Include completed and deleted tasks
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Mark a task complete (cancels its reminders)
    Complete { id: TaskId },

    /// Delete a task (cancels its reminders)
    Delete { id: TaskId },

    /// Snooze a task's reminders
    Snooze {
        id: TaskId,

        #[arg(long, default_value_t = 15)]
        minutes: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum AlarmCommand {
    /// Attach an absolute alarm to a task
    Add {
        task_id: TaskId,

        /// "YYYY-MM-DD HH:MM" (local time)
        at: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Ring {
    Once,
    Five,
    Nonstop,
}

impl Ring {
    fn flags(self) -> ReminderFlags {
        match self {
            Ring::Once => ReminderFlags::NONE,
            Ring::Five => ReminderFlags::MODE_FIVE,
            Ring::Nonstop => ReminderFlags::MODE_NONSTOP,
        }
    }
}

pub fn run_task(app: &App, tz: Tz, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Add {
            title,
            due,
            at_deadline,
            overdue,
            every_hours,
            ring,
            importance,
            hide_until,
        } => {
            let mut flags = ring.flags();
            if at_deadline {
                flags |= ReminderFlags::AT_DEADLINE;
            }
            if overdue {
                flags |= ReminderFlags::AFTER_DEADLINE;
            }
            let due = due.map(|s| parse_due(&s, tz)).transpose()?;
            let hide_until = hide_until.map(|s| parse_local(&s, tz)).transpose()?;
            if (at_deadline || overdue) && due.is_none() {
                bail!("--at-deadline/--overdue need a --due date");
            }
            if !(0..=3).contains(&importance) {
                bail!("importance must be between 0 and 3");
            }
            if title.trim().is_empty() {
                bail!("task title must not be empty");
            }
            let period = every_hours.map(reminder_period).transpose()?;

            let now = Utc::now();
            let task = app.store.create(|id| {
                let mut t = TaskReminderRecord::new(id, title, now)
                    .with_flags(flags)
                    .with_importance(importance);
                t.due = due;
                t.hide_until = hide_until;
                if let Some(p) = period {
                    t = t.with_period(p);
                }
                t
            })?;
            app.scheduler.schedule_alarm(task.id);
            println!("Added task #{} {}", task.id, task.title);
            print_state(app, task.id);
        }

        TaskCommand::List { all } => {
            let tasks = app.store.all()?;
            let mut shown = 0usize;
            for t in tasks.iter().filter(|t| all || t.is_active()) {
                println!("{}", describe(app, t, tz));
                shown += 1;
            }
            if shown == 0 {
                println!("No tasks.");
            }
        }

        TaskCommand::Complete { id } => {
            app.store.update(id, |t| t.completed_at = Some(Utc::now()))?;
            app.scheduler.schedule_alarm(id);
            println!("Completed task #{id}");
        }

        TaskCommand::Delete { id } => {
            app.store.update(id, |t| t.deleted_at = Some(Utc::now()))?;
            app.scheduler.schedule_alarm(id);
            println!("Deleted task #{id}");
        }

        TaskCommand::Snooze { id, minutes } => {
            if minutes <= 0 {
                bail!("--minutes must be positive");
            }
            app.store.fetch(id)?.with_context(|| format!("no task with id {id}"))?;
            let until = Utc::now() + Duration::minutes(minutes);
            app.scheduler.snooze(id, until);
            println!("Snoozed task #{id} until {}", local(until, tz));
            print_state(app, id);
        }
    }
    Ok(())
}

pub fn run_alarm(app: &App, tz: Tz, cmd: AlarmCommand) -> Result<()> {
    match cmd {
        AlarmCommand::Add { task_id, at } => {
            let time = parse_local(&at, tz)?;
            let alarm = app.store.add_alarm(task_id, time)?;
            app.scheduler.schedule_alarm(task_id);
            println!("Alarm #{} for task #{task_id} at {}", alarm.id, local(time, tz));
            if time <= Utc::now() {
                println!("(alarm time is in the past and will not fire)");
            }
        }
    }
    Ok(())
}

pub fn print_queue(app: &App, tz: Tz) {
    let queue = app.scheduler.queue();
    let jobs = queue.jobs();
    if jobs.is_empty() {
        println!("Queue: empty");
        return;
    }
    println!("Queue: {} pending", jobs.len());
    for job in &jobs {
        let what = match job {
            QueueEntry::Reminder { .. } => String::new(),
            QueueEntry::Alarm { alarm_id, .. } => format!(" alarm #{alarm_id}"),
        };
        println!(
            "- {} [{}] task #{}{}",
            local(job.time(), tz),
            job.kind(),
            job.task_id(),
            what
        );
    }
    if let Some(at) = queue.next_scheduled_time() {
        println!("Next wake-up: {}", local(at, tz));
    }
}

fn print_state(app: &App, id: TaskId) {
    let tz = app.scheduler.preferences().timezone;
    match app.scheduler.alarm_state(id) {
        AlarmState::Scheduled { time, kind } => println!("Next reminder: {} ({kind})", local(time, tz)),
        AlarmState::NoAlarm => println!("Next reminder: none"),
    }
}

fn describe(app: &App, t: &TaskReminderRecord, tz: Tz) -> String {
    let status = if t.is_completed() {
        "done"
    } else if t.is_deleted() {
        "deleted"
    } else {
        "open"
    };
    let due = match t.due {
        Some(DueDate::AllDay(day)) => day.format("%Y-%m-%d").to_string(),
        Some(DueDate::Timed(at)) => local(at, tz),
        None => "-".to_string(),
    };
    let next = match app.scheduler.alarm_state(t.id) {
        AlarmState::Scheduled { time, kind } => format!("{} ({kind})", local(time, tz)),
        AlarmState::NoAlarm => "-".to_string(),
    };
    format!(
        "#{} [{status}] {} | due {due} | next {next} | alarms {}",
        t.id,
        t.title,
        t.alarms.len()
    )
}

/// Longest accepted random-reminder period: ten years.
const MAX_PERIOD_HOURS: f64 = 24.0 * 365.0 * 10.0;

fn reminder_period(hours: f64) -> Result<Duration> {
    if !hours.is_finite() || hours <= 0.0 || hours > MAX_PERIOD_HOURS {
        bail!("--every-hours must be between 0 and {MAX_PERIOD_HOURS} (got {hours})");
    }
    Ok(Duration::milliseconds((hours * 3_600_000.0) as i64))
}

fn parse_due(s: &str, tz: Tz) -> Result<DueDate> {
    let s = s.trim();
    if s.contains(' ') {
        return Ok(DueDate::Timed(parse_local(s, tz)?));
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid due date '{s}'"))?;
    Ok(DueDate::AllDay(day))
}

fn parse_local(s: &str, tz: Tz) -> Result<DateTime<Utc>> {
    parse_local_deadline_to_utc(s.trim(), tz.name())
}

fn local(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string()
}
