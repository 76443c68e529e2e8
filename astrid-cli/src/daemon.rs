//! Long-running reminder loop.
//!
//! The queue publishes its wake-up time through [`TimerWake`]; the loop sleeps
//! until then, runs the dispatcher, and repeats. Edits to the task file made
//! by other `astrid` invocations trigger a full rescan.

use anyhow::Result;
use astrid_core::{WakeError, WakeKey, WakeScheduler, NOTIFICATION_WAKE};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app::App;

/// How often the loop wakes up without a pending reminder to look for
/// changes in the task file.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Wake-up backend that hands the requested time to the run loop.
#[derive(Debug)]
pub struct TimerWake {
    tx: watch::Sender<Option<DateTime<Utc>>>,
}

impl TimerWake {
    pub fn new() -> (Self, watch::Receiver<Option<DateTime<Utc>>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl WakeScheduler for TimerWake {
    fn schedule_wake(&self, at: DateTime<Utc>, key: WakeKey) -> Result<(), WakeError> {
        if key != NOTIFICATION_WAKE {
            return Err(WakeError::Rejected(format!("unknown wake key {}", key.0)));
        }
        self.tx.send(Some(at)).map_err(|_| WakeError::Closed)
    }

    fn cancel_wake(&self, key: WakeKey) -> Result<(), WakeError> {
        if key != NOTIFICATION_WAKE {
            return Ok(());
        }
        self.tx.send(None).map_err(|_| WakeError::Closed)
    }
}

/// How long to sleep before the next check.
pub fn sleep_for(next: Option<DateTime<Utc>>, now: DateTime<Utc>, poll: Duration) -> Duration {
    match next {
        Some(at) => (at - now).to_std().unwrap_or_default().min(poll),
        None => poll,
    }
}

pub async fn run(app: App, mut wake_rx: watch::Receiver<Option<DateTime<Utc>>>) -> Result<()> {
    let scheduled = app.scheduler.schedule_all_alarms();
    app.save_queue()?;
    info!(scheduled, "reminder loop started");

    let mut tasks_mtime = app.store.modified();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let next = *wake_rx.borrow_and_update();
        let pause = sleep_for(next, Utc::now(), POLL_INTERVAL);
        debug!(?next, ?pause, "waiting");

        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted, stopping reminder loop");
                break;
            }
            changed = wake_rx.changed() => {
                if changed.is_err() {
                    warn!("wake-up channel closed, stopping reminder loop");
                    break;
                }
            }
            _ = tokio::time::sleep(pause) => {
                if next.is_some_and(|at| at <= Utc::now()) {
                    let report = app.dispatcher.run();
                    info!(
                        shown = report.shown,
                        suppressed = report.suppressed,
                        failed = report.failed,
                        deferred = report.deferred,
                        "dispatch finished"
                    );
                    if let Err(e) = app.save_queue() {
                        warn!("cannot save queue snapshot: {e:#}");
                    }
                    // Our own reminder stamps are not outside edits.
                    tasks_mtime = app.store.modified();
                    continue;
                }

                let mtime = app.store.modified();
                if mtime != tasks_mtime {
                    tasks_mtime = mtime;
                    let n = app.scheduler.schedule_all_alarms();
                    info!(scheduled = n, "task file changed, rescanned");
                    if let Err(e) = app.save_queue() {
                        warn!("cannot save queue snapshot: {e:#}");
                    }
                }
            }
        }
    }

    app.save_queue()
}
