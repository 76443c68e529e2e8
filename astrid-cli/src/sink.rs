use astrid_core::{Notification, NotificationSink, NotifyError, RingMode, TaskId};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Prints notifications to stdout and appends them to a JSONL log.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    log_path: PathBuf,
}

impl ConsoleSink {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    fn append(&self, n: &Notification) -> std::io::Result<()> {
        let line = serde_json::to_string(n).map_err(std::io::Error::other)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        writeln!(f, "{line}")
    }
}

fn bell(ring: RingMode) -> &'static str {
    match ring {
        RingMode::Once => "*",
        RingMode::Five => "*****",
        RingMode::Nonstop => "*** until dismissed ***",
    }
}

impl NotificationSink for ConsoleSink {
    fn show(&self, n: &Notification) -> Result<(), NotifyError> {
        self.append(n)
            .map_err(|e| NotifyError::Sink(format!("{}: {e}", self.log_path.display())))?;
        println!(
            "{} [{}] #{} {} ({})",
            n.shown_at.format("%Y-%m-%d %H:%M"),
            n.kind,
            n.task_id,
            n.title,
            bell(n.ring)
        );
        Ok(())
    }

    fn dismiss(&self, task_id: TaskId) {
        debug!("dismissing notification for task {task_id}");
    }
}
