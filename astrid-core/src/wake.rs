//! Wake-up port: asks the platform to call us back at an absolute time.
//!
//! Registrations are keyed; scheduling a key again replaces the previous
//! registration for that key.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::WakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeKey(pub &'static str);

/// Key under which the notification queue registers its own wake-up.
pub const NOTIFICATION_WAKE: WakeKey = WakeKey("astrid.notifications");

pub trait WakeScheduler: Send + Sync {
    fn schedule_wake(&self, at: DateTime<Utc>, key: WakeKey) -> Result<(), WakeError>;
    fn cancel_wake(&self, key: WakeKey) -> Result<(), WakeError>;
}

impl<W: WakeScheduler + ?Sized> WakeScheduler for std::sync::Arc<W> {
    fn schedule_wake(&self, at: DateTime<Utc>, key: WakeKey) -> Result<(), WakeError> {
        (**self).schedule_wake(at, key)
    }

    fn cancel_wake(&self, key: WakeKey) -> Result<(), WakeError> {
        (**self).cancel_wake(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCall {
    Schedule(WakeKey, DateTime<Utc>),
    Cancel(WakeKey),
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<WakeCall>,
    pending: HashMap<WakeKey, DateTime<Utc>>,
    reject: Option<String>,
}

/// In-memory backend that only records registrations.
///
/// Used by one-shot CLI commands (nothing stays alive to be woken) and by tests.
#[derive(Debug, Default)]
pub struct RecordingWakeScheduler {
    inner: Mutex<Recorded>,
}

impl RecordingWakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with `reason`; `None` restores normal behavior.
    pub fn reject_with(&self, reason: Option<&str>) {
        self.lock().reject = reason.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<WakeCall> {
        self.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<WakeCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn pending(&self, key: WakeKey) -> Option<DateTime<Utc>> {
        self.lock().pending.get(&key).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WakeScheduler for RecordingWakeScheduler {
    fn schedule_wake(&self, at: DateTime<Utc>, key: WakeKey) -> Result<(), WakeError> {
        let mut inner = self.lock();
        if let Some(reason) = &inner.reject {
            return Err(WakeError::Rejected(reason.clone()));
        }
        inner.calls.push(WakeCall::Schedule(key, at));
        inner.pending.insert(key, at);
        Ok(())
    }

    fn cancel_wake(&self, key: WakeKey) -> Result<(), WakeError> {
        let mut inner = self.lock();
        if let Some(reason) = &inner.reject {
            return Err(WakeError::Rejected(reason.clone()));
        }
        inner.calls.push(WakeCall::Cancel(key));
        inner.pending.remove(&key);
        Ok(())
    }
}
