//! Dispatcher: what runs when the notification wake-up fires.
//!
//! 1. Inside quiet hours: only push the wake-up past the window.
//! 2. Otherwise pop everything due by the end of the current minute and hand
//!    each entry to the [`Notifier`]. A failing entry is logged and dropped.
//!    Shown reminders chain into the task's next reminder; suppressed or
//!    failed ones do not.
//! 3. Always re-register the queue's next wake-up.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::NotifyError;
use crate::notifier::{Notifier, NotifyOutcome, SuppressReason};
use crate::queue::QueueEntry;
use crate::scheduler::ReminderScheduler;
use crate::store::TaskStore;
use crate::time::end_of_minute;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Run skipped because it fell inside quiet hours.
    pub deferred: bool,
    pub shown: usize,
    pub suppressed: usize,
    pub failed: usize,
    /// Wake-up registered at the end of the run, if any.
    pub next_wake: Option<DateTime<Utc>>,
}

impl DispatchReport {
    pub fn popped(&self) -> usize {
        self.shown + self.suppressed + self.failed
    }
}

pub struct Dispatcher<S: TaskStore, C: Clock, N: Notifier> {
    scheduler: Arc<ReminderScheduler<S, C>>,
    notifier: N,
}

impl<S: TaskStore, C: Clock, N: Notifier> Dispatcher<S, C, N> {
    pub fn new(scheduler: Arc<ReminderScheduler<S, C>>, notifier: N) -> Self {
        Self { scheduler, notifier }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn run(&self) -> DispatchReport {
        let now = self.scheduler.clock().now();
        let prefs = self.scheduler.preferences();
        let mut report = DispatchReport::default();

        let in_quiet_hours = prefs
            .quiet_hours
            .is_some_and(|q| q.contains(now, prefs.timezone));

        if in_quiet_hours {
            info!("quiet hours at {now}, deferring notifications");
            report.deferred = true;
        } else {
            let cutoff = end_of_minute(now);
            let jobs = self.scheduler.queue().pop_due_by(cutoff);
            debug!("{} notification jobs due at {now}", jobs.len());
            for job in &jobs {
                self.deliver(job, cutoff, &mut report);
            }
        }

        report.next_wake = match self.scheduler.queue().schedule_next_after(now) {
            Ok(at) => at,
            Err(e) => {
                warn!("cannot register next notification wake-up: {e}");
                None
            }
        };
        report
    }

    fn deliver(&self, job: &QueueEntry, cutoff: DateTime<Utc>, report: &mut DispatchReport) {
        let task_id = job.task_id();
        match self.notifier.notify(job) {
            Ok(NotifyOutcome::Shown(n)) => {
                info!("notified task {} ({})", n.task_id, n.kind);
                report.shown += 1;
                // Only a shown reminder moves `reminder_last`; anything else
                // would just compute the same reminder again.
                if matches!(job, QueueEntry::Reminder { .. }) {
                    self.scheduler.schedule_alarm_after(task_id, Some(cutoff));
                }
            }
            Ok(NotifyOutcome::Suppressed(reason)) => {
                debug!("task {task_id} notification suppressed: {reason:?}");
                report.suppressed += 1;
                if reason == SuppressReason::Inactive {
                    self.scheduler.clear_all_alarms(task_id);
                }
            }
            Err(e) => {
                warn!("notification for task {task_id} failed: {e}");
                report.failed += 1;
                if matches!(e, NotifyError::TaskNotFound(_)) {
                    self.scheduler.clear_all_alarms(task_id);
                }
            }
        }
    }
}
