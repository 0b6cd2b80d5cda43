//! In-memory record store.
//!
//! Holds habits and completion records in insertion order. Suitable for
//! tests and for embedding where persistence is handled elsewhere.

use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard};

use super::RecordStore;
use crate::error::StoreError;
use crate::habit::{Habit, HabitChanges, HabitFilter};
use crate::ledger::{CompletionFilter, CompletionRecord};

#[derive(Debug, Default)]
pub struct MemoryStore {
    habits: Mutex<Vec<Habit>>,
    completions: Mutex<Vec<CompletionRecord>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Unreachable("memory store lock poisoned".into()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn habit_count(&self) -> usize {
        self.habits.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl RecordStore<Habit> for MemoryStore {
    fn insert(&self, record: Habit) -> Result<Habit, StoreError> {
        let mut habits = lock(&self.habits)?;
        if habits.iter().any(|h| h.id == record.id) {
            return Err(StoreError::QueryFailed(format!(
                "duplicate habit id {}",
                record.id
            )));
        }
        habits.push(record.clone());
        Ok(record)
    }

    fn update(&self, filter: &HabitFilter, patch: &HabitChanges) -> Result<Vec<Habit>, StoreError> {
        let mut habits = lock(&self.habits)?;
        let mut affected = Vec::new();
        for habit in habits.iter_mut().filter(|h| filter.matches(h)) {
            habit.apply(patch);
            affected.push(habit.clone());
        }
        Ok(affected)
    }

    fn select(&self, filter: &HabitFilter) -> Result<Vec<Habit>, StoreError> {
        Ok(lock(&self.habits)?
            .iter()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect())
    }

    fn delete(&self, filter: &HabitFilter) -> Result<Vec<Habit>, StoreError> {
        let mut habits = lock(&self.habits)?;
        let (removed, kept) = habits.drain(..).partition(|h| filter.matches(h));
        *habits = kept;
        Ok(removed)
    }
}

impl RecordStore<CompletionRecord> for MemoryStore {
    fn insert(&self, record: CompletionRecord) -> Result<CompletionRecord, StoreError> {
        lock(&self.completions)?.push(record.clone());
        Ok(record)
    }

    fn update(
        &self,
        _filter: &CompletionFilter,
        patch: &Infallible,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        match *patch {}
    }

    fn select(&self, filter: &CompletionFilter) -> Result<Vec<CompletionRecord>, StoreError> {
        Ok(lock(&self.completions)?
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    fn delete(&self, filter: &CompletionFilter) -> Result<Vec<CompletionRecord>, StoreError> {
        let mut completions = lock(&self.completions)?;
        let (removed, kept) = completions.drain(..).partition(|c| filter.matches(c));
        *completions = kept;
        Ok(removed)
    }
}
