//! Reminder sink.
//!
//! The sweeper pushes one entry per user listing habits that need watering;
//! the user-facing surface drains them. Delivery is at-least-once, so
//! redisplaying an entry is harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEntry {
    pub user_id: String,
    pub habit_names: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ReminderEntry {
    pub fn message(&self) -> String {
        match self.habit_names.as_slice() {
            [] => "Your plants are doing fine.".to_string(),
            [one] => format!("Your plant '{one}' is wilting. Water it today!"),
            many => format!(
                "{} plants are wilting: {}. Water them today!",
                many.len(),
                many.join(", ")
            ),
        }
    }
}

/// Destination for reminder entries, keyed by user id.
pub trait ReminderSink: Send + Sync {
    /// Queue a reminder. Pushing the same names as the newest pending entry
    /// for that user is a no-op.
    fn push(
        &self,
        user_id: &str,
        habit_names: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Take every pending entry for `user_id`, oldest first.
    fn drain(&self, user_id: &str) -> Result<Vec<ReminderEntry>, StoreError>;

    /// Drop every pending entry for `user_id`.
    fn clear(&self, user_id: &str) -> Result<(), StoreError>;
}

/// Process-local reminder queue.
#[derive(Debug, Default)]
pub struct MemoryReminders {
    pending: Mutex<HashMap<String, Vec<ReminderEntry>>>,
}

impl MemoryReminders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries waiting for `user_id`, without consuming them.
    pub fn peek(&self, user_id: &str) -> Vec<ReminderEntry> {
        self.lock()
            .map(|p| p.get(user_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<ReminderEntry>>>, StoreError> {
        self.pending
            .lock()
            .map_err(|_| StoreError::Unreachable("reminder queue lock poisoned".into()))
    }
}

impl ReminderSink for MemoryReminders {
    fn push(
        &self,
        user_id: &str,
        habit_names: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut pending = self.lock()?;
        let queue = pending.entry(user_id.to_string()).or_default();
        if queue.last().is_some_and(|e| e.habit_names == habit_names) {
            return Ok(());
        }
        queue.push(ReminderEntry {
            user_id: user_id.to_string(),
            habit_names: habit_names.to_vec(),
            created_at: at,
        });
        Ok(())
    }

    fn drain(&self, user_id: &str) -> Result<Vec<ReminderEntry>, StoreError> {
        Ok(self.lock()?.remove(user_id).unwrap_or_default())
    }

    fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.lock()?.remove(user_id);
        Ok(())
    }
}
