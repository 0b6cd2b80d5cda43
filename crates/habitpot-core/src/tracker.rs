//! Habit operations exposed to the user-facing layer.
//!
//! `HabitTracker` owns the request-side half of the lifecycle: creating and
//! editing habits, confirming them against the completion ledger, and
//! reading history and reminders. It is `Send + Sync` and meant to be shared
//! behind an `Arc` by concurrent request handlers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, ValidationError};
use crate::habit::{
    confirm_transition, ConfirmOutcome, Frequency, Habit, HabitChanges, HabitFilter, HabitPatch,
    HabitView,
};
use crate::ledger::{CompletionLedger, CompletionRecord, StoreLedger};
use crate::period::{period_key, period_key_at};
use crate::reminder::{ReminderEntry, ReminderSink};
use crate::storage::RecordStore;

/// Completion history for one habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionHistory {
    pub habit_id: String,
    pub frequency: Frequency,
    /// Newest first.
    pub completions: Vec<CompletionRecord>,
    pub total_completions: usize,
}

pub struct HabitTracker {
    habits: Arc<dyn RecordStore<Habit>>,
    ledger: StoreLedger,
    reminders: Arc<dyn ReminderSink>,
    clock: Arc<dyn Clock>,
}

impl HabitTracker {
    pub fn new(
        habits: Arc<dyn RecordStore<Habit>>,
        completions: Arc<dyn RecordStore<CompletionRecord>>,
        reminders: Arc<dyn ReminderSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger: StoreLedger::new(completions, habits.clone()),
            habits,
            reminders,
            clock,
        }
    }

    /// Build a tracker whose habits, ledger and reminders all live in one
    /// backend, using the system clock.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RecordStore<Habit> + RecordStore<CompletionRecord> + ReminderSink + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend, Arc::new(SystemClock))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ledger(&self) -> &StoreLedger {
        &self.ledger
    }

    /// Create a flourishing, never-confirmed habit.
    pub fn create_habit(&self, user_id: &str, name: &str, frequency: Frequency) -> Result<Habit> {
        let name = validate_name(name)?;
        let habit = self
            .habits
            .insert(Habit::new(user_id, name, frequency, self.clock.now()))?;
        info!(habit_id = %habit.id, user_id, %frequency, "habit created");
        Ok(habit)
    }

    /// All of `user_id`'s habits with their completion flags.
    pub fn get_habits(&self, user_id: &str) -> Result<Vec<HabitView>> {
        let now = self.clock.now();
        let habits = self.habits.select(&HabitFilter::by_user(user_id))?;
        Ok(habits
            .into_iter()
            .map(|habit| {
                let done = self
                    .ledger
                    .is_already_completed(&habit.id, habit.frequency, now);
                HabitView::new(habit, done)
            })
            .collect())
    }

    pub fn get_habit(&self, user_id: &str, habit_id: &str) -> Result<HabitView> {
        let habit = self.find_owned(user_id, habit_id)?;
        let done = self
            .ledger
            .is_already_completed(&habit.id, habit.frequency, self.clock.now());
        Ok(HabitView::new(habit, done))
    }

    /// Confirm ("water") a habit.
    ///
    /// A second confirmation in the same period is a no-op reporting
    /// `already_completed`. Otherwise the ledger append is attempted first;
    /// its failure is logged and reported through `ledger_recorded` but does
    /// not stop the state update. If the state update fails, the ledger
    /// record just written is retracted.
    pub fn confirm_habit(
        &self,
        user_id: &str,
        habit_id: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<ConfirmOutcome> {
        let as_of = as_of.unwrap_or_else(|| self.clock.now());
        let habit = self.find_owned(user_id, habit_id)?;
        let key = period_key_at(habit.frequency, as_of);

        if self
            .ledger
            .is_already_completed(&habit.id, habit.frequency, as_of)
        {
            debug!(habit_id, period_key = %key, "habit already completed this period");
            return Ok(ConfirmOutcome {
                habit: HabitView::new(habit, true),
                revived: false,
                already_completed: true,
                period_key: key,
                ledger_recorded: false,
            });
        }

        let recorded = match self
            .ledger
            .record_completion(&habit.id, user_id, habit.frequency, as_of)
        {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(habit_id, error = %e, "confirming without a ledger record");
                None
            }
        };

        let transition = confirm_transition(&habit, as_of);
        let updated = match self
            .habits
            .update(&HabitFilter::owned(user_id, habit_id), &transition.changes)
        {
            Ok(rows) => rows.into_iter().next().ok_or(CoreError::NotFound),
            Err(e) => Err(CoreError::from(e)),
        };
        let updated = match updated {
            Ok(habit) => habit,
            Err(e) => {
                if let Some(record) = &recorded {
                    if let Err(retract_err) = self.ledger.retract(record) {
                        warn!(habit_id, error = %retract_err, "failed to retract completion record");
                    }
                }
                return Err(e);
            }
        };

        if transition.revived {
            info!(habit_id, user_id, "wilting habit revived");
        }

        Ok(ConfirmOutcome {
            habit: HabitView::new(updated, true),
            revived: transition.revived,
            already_completed: false,
            period_key: key,
            ledger_recorded: recorded.is_some(),
        })
    }

    /// Rename a habit and/or change its frequency.
    pub fn update_habit(&self, user_id: &str, habit_id: &str, patch: HabitPatch) -> Result<Habit> {
        let changes = HabitChanges {
            name: patch.name.as_deref().map(validate_name).transpose()?,
            frequency: patch.frequency,
            ..HabitChanges::default()
        };
        if changes.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }

        self.habits
            .update(&HabitFilter::owned(user_id, habit_id), &changes)?
            .into_iter()
            .next()
            .ok_or(CoreError::NotFound)
    }

    /// Delete a habit. Its ledger records are left in place.
    pub fn delete_habit(&self, user_id: &str, habit_id: &str) -> Result<()> {
        let removed = self.habits.delete(&HabitFilter::owned(user_id, habit_id))?;
        if removed.is_empty() {
            return Err(CoreError::NotFound);
        }
        info!(habit_id, user_id, "habit deleted");
        Ok(())
    }

    /// Confirmations within the last `days_back` days, newest first.
    ///
    /// When `last_confirmed_at` falls inside the window but no ledger record
    /// shares its date, a record for it is synthesized so confirmations made
    /// while the ledger was unavailable still show up.
    pub fn get_completion_history(
        &self,
        user_id: &str,
        habit_id: &str,
        days_back: u32,
    ) -> Result<CompletionHistory> {
        let habit = self.find_owned(user_id, habit_id)?;
        let since = self.clock.now().date_naive() - Duration::days(i64::from(days_back));

        let mut completions = self.ledger.history(&habit.id, since).unwrap_or_else(|e| {
            warn!(habit_id, error = %e, "completion history unavailable");
            Vec::new()
        });

        if let Some(last) = habit.last_confirmed_at {
            let date = last.date_naive();
            if date >= since && !completions.iter().any(|c| c.completion_date == date) {
                completions.push(CompletionRecord {
                    habit_id: habit.id.clone(),
                    user_id: habit.user_id.clone(),
                    period_key: period_key(habit.frequency, date),
                    completion_date: date,
                    confirmed_at: last,
                });
            }
        }

        Ok(CompletionHistory {
            habit_id: habit.id,
            frequency: habit.frequency,
            total_completions: completions.len(),
            completions,
        })
    }

    /// Take pending reminders for `user_id`.
    pub fn reminders(&self, user_id: &str) -> Result<Vec<ReminderEntry>> {
        Ok(self.reminders.drain(user_id)?)
    }

    pub fn clear_reminders(&self, user_id: &str) -> Result<()> {
        Ok(self.reminders.clear(user_id)?)
    }

    fn find_owned(&self, user_id: &str, habit_id: &str) -> Result<Habit> {
        self.habits
            .select(&HabitFilter::owned(user_id, habit_id))?
            .into_iter()
            .next()
            .ok_or(CoreError::NotFound)
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty("name".into()).into());
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::habit::PlantState;
    use crate::reminder::MemoryReminders;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
    }

    fn tracker() -> (HabitTracker, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let tracker = HabitTracker::new(
            store.clone(),
            store.clone(),
            Arc::new(MemoryReminders::new()),
            clock.clone(),
        );
        (tracker, store, clock)
    }

    #[test]
    fn create_trims_and_rejects_blank_names() {
        let (tracker, _, _) = tracker();
        let habit = tracker.create_habit("u1", "  Meditate ", Frequency::Daily).unwrap();
        assert_eq!(habit.name, "Meditate");
        assert_eq!(habit.created_at, t0());

        let err = tracker.create_habit("u1", "   ", Frequency::Daily).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Empty(_))));
    }

    #[test]
    fn other_users_habit_is_not_found() {
        let (tracker, _, _) = tracker();
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();

        assert!(matches!(tracker.get_habit("u2", &habit.id), Err(CoreError::NotFound)));
        assert!(matches!(
            tracker.confirm_habit("u2", &habit.id, None),
            Err(CoreError::NotFound)
        ));
        assert!(matches!(tracker.delete_habit("u2", &habit.id), Err(CoreError::NotFound)));
        assert!(matches!(
            tracker.get_completion_history("u2", &habit.id, 30),
            Err(CoreError::NotFound)
        ));
    }

    #[test]
    fn confirm_twice_same_day_is_deduplicated() {
        let (tracker, store, clock) = tracker();
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();

        let first = tracker.confirm_habit("u1", &habit.id, None).unwrap();
        assert!(!first.already_completed);
        assert!(first.ledger_recorded);
        assert!(first.habit.is_completed_today);
        assert_eq!(first.period_key, "2025-03-03");

        clock.advance(Duration::hours(3));
        let second = tracker.confirm_habit("u1", &habit.id, None).unwrap();
        assert!(second.already_completed);
        assert!(!second.revived);
        assert_eq!(second.habit.habit.last_confirmed_at, Some(t0()));
        assert_eq!(store.completion_count(), 1);
    }

    #[test]
    fn confirm_reports_revival() {
        let (tracker, store, _) = tracker();
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();
        RecordStore::<Habit>::update(&*store, &HabitFilter::by_id(&habit.id), &HabitChanges::wilt())
            .unwrap();

        let outcome = tracker.confirm_habit("u1", &habit.id, None).unwrap();
        assert!(outcome.revived);
        assert_eq!(outcome.habit.habit.plant_state, PlantState::Flourishing);
    }

    struct FailingUpdates {
        inner: Arc<MemoryStore>,
        failures: std::sync::atomic::AtomicUsize,
    }

    impl RecordStore<Habit> for FailingUpdates {
        fn insert(&self, record: Habit) -> std::result::Result<Habit, crate::error::StoreError> {
            RecordStore::<Habit>::insert(&*self.inner, record)
        }
        fn update(
            &self,
            filter: &HabitFilter,
            patch: &HabitChanges,
        ) -> std::result::Result<Vec<Habit>, crate::error::StoreError> {
            use std::sync::atomic::Ordering;
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(crate::error::StoreError::Unreachable("down".into()));
            }
            RecordStore::<Habit>::update(&*self.inner, filter, patch)
        }
        fn select(&self, filter: &HabitFilter) -> std::result::Result<Vec<Habit>, crate::error::StoreError> {
            RecordStore::<Habit>::select(&*self.inner, filter)
        }
        fn delete(&self, filter: &HabitFilter) -> std::result::Result<Vec<Habit>, crate::error::StoreError> {
            RecordStore::<Habit>::delete(&*self.inner, filter)
        }
    }

    #[test]
    fn failed_state_update_leaves_no_ledger_record() {
        let store = Arc::new(MemoryStore::new());
        let habits = Arc::new(FailingUpdates {
            inner: store.clone(),
            failures: std::sync::atomic::AtomicUsize::new(1),
        });
        let tracker = HabitTracker::new(
            habits,
            store.clone(),
            Arc::new(MemoryReminders::new()),
            Arc::new(ManualClock::new(t0())),
        );
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();
        RecordStore::<Habit>::update(&*store, &HabitFilter::by_id(&habit.id), &HabitChanges::wilt())
            .unwrap();

        let err = tracker.confirm_habit("u1", &habit.id, None).unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
        assert_eq!(store.completion_count(), 0);

        let retry = tracker.confirm_habit("u1", &habit.id, None).unwrap();
        assert!(!retry.already_completed);
        assert!(retry.revived);
        assert_eq!(retry.habit.habit.plant_state, PlantState::Flourishing);
        assert_eq!(store.completion_count(), 1);
    }

    #[test]
    fn backdated_confirm_does_not_rewind_last_confirmation() {
        let (tracker, _, clock) = tracker();
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();
        clock.advance(Duration::days(3));
        let today = clock.now();
        tracker.confirm_habit("u1", &habit.id, None).unwrap();

        let backdated = tracker.confirm_habit("u1", &habit.id, Some(t0())).unwrap();
        assert!(!backdated.already_completed);
        assert_eq!(backdated.habit.habit.last_confirmed_at, Some(today));
    }

    #[test]
    fn update_requires_a_field() {
        let (tracker, _, _) = tracker();
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();

        let err = tracker
            .update_habit("u1", &habit.id, HabitPatch::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyPatch)));

        let updated = tracker
            .update_habit(
                "u1",
                &habit.id,
                HabitPatch {
                    name: None,
                    frequency: Some(Frequency::Weekly),
                },
            )
            .unwrap();
        assert_eq!(updated.frequency, Frequency::Weekly);
        assert_eq!(updated.name, "Meditate");
    }

    #[test]
    fn update_missing_habit_is_not_found() {
        let (tracker, _, _) = tracker();
        let err = tracker
            .update_habit(
                "u1",
                "nope",
                HabitPatch {
                    name: Some("x".into()),
                    frequency: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn delete_leaves_ledger_orphaned() {
        let (tracker, store, _) = tracker();
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();
        tracker.confirm_habit("u1", &habit.id, None).unwrap();

        tracker.delete_habit("u1", &habit.id).unwrap();
        assert_eq!(store.habit_count(), 0);
        assert_eq!(store.completion_count(), 1);
        assert!(matches!(tracker.delete_habit("u1", &habit.id), Err(CoreError::NotFound)));
    }

    #[test]
    fn history_window_and_order() {
        let (tracker, _, clock) = tracker();
        let habit = tracker.create_habit("u1", "Meditate", Frequency::Daily).unwrap();
        for day in 0..5 {
            tracker
                .confirm_habit("u1", &habit.id, Some(t0() + Duration::days(day)))
                .unwrap();
        }
        clock.set(t0() + Duration::days(4));

        let history = tracker.get_completion_history("u1", &habit.id, 2).unwrap();
        assert_eq!(history.total_completions, 3);
        assert_eq!(history.completions[0].confirmed_at, t0() + Duration::days(4));
        assert_eq!(history.frequency, Frequency::Daily);
    }

    #[test]
    fn get_habits_reports_flags_per_frequency() {
        let (tracker, _, _) = tracker();
        let daily = tracker.create_habit("u1", "Floss", Frequency::Daily).unwrap();
        let weekly = tracker.create_habit("u1", "Call mum", Frequency::Weekly).unwrap();
        tracker.create_habit("u2", "Other", Frequency::Daily).unwrap();
        tracker.confirm_habit("u1", &weekly.id, None).unwrap();

        let views = tracker.get_habits("u1").unwrap();
        assert_eq!(views.len(), 2);
        let d = views.iter().find(|v| v.habit.id == daily.id).unwrap();
        let w = views.iter().find(|v| v.habit.id == weekly.id).unwrap();
        assert!(!d.is_completed_today);
        assert!(w.is_completed_this_week);
        assert!(!w.is_completed_today);
    }
}
