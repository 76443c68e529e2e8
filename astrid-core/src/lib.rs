//! astrid-core: reminder scheduling engine for the Astrid task list.
//!
//! Task saved -> [`ReminderScheduler`] computes the next reminder ->
//! [`NotificationQueue`] holds it and asks the platform for a wake-up ->
//! wake-up fires -> [`Dispatcher`] pops what is due and hands it to a
//! [`Notifier`] -> the queue re-registers its next wake-up.

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod notifier;
pub mod preferences;
pub mod queue;
pub mod quiet_hours;
pub mod reminders;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod time;
pub mod wake;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{NotifyError, StoreError, WakeError};
pub use notifier::{
    Notification, NotificationSink, Notifier, NotifyOutcome, RecordingNotificationSink, RingMode,
    SuppressReason, TaskNotifier,
};
pub use preferences::ReminderPreferences;
pub use queue::{EntryKey, NotificationQueue, QueueEntry};
pub use quiet_hours::QuietHours;
pub use reminders::{ReminderCalculator, ReminderCandidates, ReminderType, ScheduledReminder};
pub use scheduler::{AlarmState, ReminderScheduler};
pub use store::{MemoryTaskStore, TaskStore};
pub use task::{AlarmId, DueDate, ReminderFlags, TaskAlarm, TaskId, TaskReminderRecord};
pub use wake::{RecordingWakeScheduler, WakeCall, WakeKey, WakeScheduler, NOTIFICATION_WAKE};
