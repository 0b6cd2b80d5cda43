//! Completion ledger.
//!
//! Every confirmation appends a [`CompletionRecord`] tagged with its period
//! key. "Already completed this period" is answered from two signals in a
//! fixed order:
//!
//! 1. a ledger record for `(habit_id, period_key(frequency, as_of))`;
//! 2. otherwise the habit's `last_confirmed_at`, if it falls on the same day
//!    (daily) or inside the same Monday..Sunday span (weekly).
//!
//! A failed lookup of either signal counts as "not completed": duplicate
//! suppression degrades to allowing the confirmation, never to blocking it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CoreError, Result, StoreError};
use crate::habit::{Frequency, Habit, HabitFilter};
use crate::period::{period_key_at, same_period};
use crate::storage::{Record, RecordStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub habit_id: String,
    pub user_id: String,
    pub period_key: String,
    pub completion_date: NaiveDate,
    pub confirmed_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(
        habit_id: impl Into<String>,
        user_id: impl Into<String>,
        frequency: Frequency,
        confirmed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            habit_id: habit_id.into(),
            user_id: user_id.into(),
            period_key: period_key_at(frequency, confirmed_at),
            completion_date: confirmed_at.date_naive(),
            confirmed_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionFilter {
    pub habit_id: Option<String>,
    pub period_key: Option<String>,
    /// Inclusive lower bound on `completion_date`.
    pub since: Option<NaiveDate>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl CompletionFilter {
    pub fn for_period(habit_id: &str, period_key: &str) -> Self {
        Self {
            habit_id: Some(habit_id.to_string()),
            period_key: Some(period_key.to_string()),
            ..Self::default()
        }
    }

    pub fn since(habit_id: &str, since: NaiveDate) -> Self {
        Self {
            habit_id: Some(habit_id.to_string()),
            since: Some(since),
            ..Self::default()
        }
    }

    /// Matches exactly the ledger row written for `record`.
    pub fn exact(record: &CompletionRecord) -> Self {
        Self {
            habit_id: Some(record.habit_id.clone()),
            period_key: Some(record.period_key.clone()),
            since: None,
            confirmed_at: Some(record.confirmed_at),
        }
    }

    pub fn matches(&self, record: &CompletionRecord) -> bool {
        self.habit_id.as_deref().map_or(true, |id| record.habit_id == id)
            && self.period_key.as_deref().map_or(true, |k| record.period_key == k)
            && self.since.map_or(true, |d| record.completion_date >= d)
            && self.confirmed_at.map_or(true, |at| record.confirmed_at == at)
    }
}

/// Records are append-only, so there is no patch type that can be built.
impl Record for CompletionRecord {
    type Filter = CompletionFilter;
    type Patch = Infallible;
}

/// Duplicate-completion detection with a ledger-first, timestamp-second
/// precedence.
pub trait CompletionLedger: Send + Sync {
    /// Whether `habit_id` already has a confirmation in the period
    /// containing `as_of`. Never fails; lookup errors read as `false`.
    fn is_already_completed(&self, habit_id: &str, frequency: Frequency, as_of: DateTime<Utc>)
        -> bool;

    /// Append a confirmation for the period containing `as_of`.
    ///
    /// # Errors
    /// Returns `LedgerWriteFailed` when the append fails.
    fn record_completion(
        &self,
        habit_id: &str,
        user_id: &str,
        frequency: Frequency,
        as_of: DateTime<Utc>,
    ) -> Result<CompletionRecord>;
}

/// Ledger backed by record stores for completions and habits.
#[derive(Clone)]
pub struct StoreLedger {
    completions: Arc<dyn RecordStore<CompletionRecord>>,
    habits: Arc<dyn RecordStore<Habit>>,
}

impl StoreLedger {
    pub fn new(
        completions: Arc<dyn RecordStore<CompletionRecord>>,
        habits: Arc<dyn RecordStore<Habit>>,
    ) -> Self {
        Self { completions, habits }
    }

    /// Ledger records for `habit_id` on or after `since`, newest first.
    pub fn history(
        &self,
        habit_id: &str,
        since: NaiveDate,
    ) -> std::result::Result<Vec<CompletionRecord>, StoreError> {
        let mut records = self.completions.select(&CompletionFilter::since(habit_id, since))?;
        records.sort_by(|a, b| b.confirmed_at.cmp(&a.confirmed_at));
        Ok(records)
    }

    /// Remove a record written by [`CompletionLedger::record_completion`]
    /// whose confirmation was not applied.
    pub fn retract(&self, record: &CompletionRecord) -> std::result::Result<(), StoreError> {
        self.completions.delete(&CompletionFilter::exact(record))?;
        Ok(())
    }

    fn ledger_has_period(&self, habit_id: &str, key: &str) -> bool {
        match self.completions.select(&CompletionFilter::for_period(habit_id, key)) {
            Ok(records) => !records.is_empty(),
            Err(e) => {
                warn!(habit_id, period_key = key, error = %e, "completion ledger lookup failed");
                false
            }
        }
    }

    fn last_confirmation_in_period(
        &self,
        habit_id: &str,
        frequency: Frequency,
        as_of: DateTime<Utc>,
    ) -> bool {
        match self.habits.select(&HabitFilter::by_id(habit_id)) {
            Ok(habits) => habits
                .first()
                .and_then(|h| h.last_confirmed_at)
                .is_some_and(|at| same_period(frequency, at, as_of)),
            Err(e) => {
                warn!(habit_id, error = %e, "last confirmation lookup failed");
                false
            }
        }
    }
}

impl CompletionLedger for StoreLedger {
    fn is_already_completed(
        &self,
        habit_id: &str,
        frequency: Frequency,
        as_of: DateTime<Utc>,
    ) -> bool {
        let key = period_key_at(frequency, as_of);
        if self.ledger_has_period(habit_id, &key) {
            debug!(habit_id, period_key = %key, "completion found in ledger");
            return true;
        }
        self.last_confirmation_in_period(habit_id, frequency, as_of)
    }

    fn record_completion(
        &self,
        habit_id: &str,
        user_id: &str,
        frequency: Frequency,
        as_of: DateTime<Utc>,
    ) -> Result<CompletionRecord> {
        self.completions
            .insert(CompletionRecord::new(habit_id, user_id, frequency, as_of))
            .map_err(CoreError::LedgerWriteFailed)
    }
}
