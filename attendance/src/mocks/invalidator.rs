//! Invalidator that records what it was asked to do.

use crate::authority::AttendanceInvalidator;
use crate::types::{EventId, UserId};
use std::sync::{Arc, Mutex, PoisonError};

/// [`AttendanceInvalidator`] that remembers every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingInvalidator {
    calls: Arc<Mutex<Vec<(UserId, EventId)>>>,
}

impl RecordingInvalidator {
    /// Create an invalidator with no recorded calls
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(user, event)` pair invalidated so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<(UserId, EventId)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AttendanceInvalidator for RecordingInvalidator {
    async fn invalidate_attendance(&self, user_id: &UserId, event_id: &EventId) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.clone(), event_id.clone()));
    }
}
