//! Habit lifecycle state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Flourishing --(no confirmation for >= threshold)--> Wilting
//! Wilting     --(confirm)--------------------------> Flourishing
//! ```
//!
//! Elapsed time is measured from `last_confirmed_at`, or from `created_at`
//! for habits that were never confirmed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Frequency, Habit, HabitChanges, PlantState};

/// Inactivity after which a flourishing habit wilts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiltThresholds {
    pub daily: Duration,
    pub weekly: Duration,
}

impl Default for WiltThresholds {
    fn default() -> Self {
        Self {
            daily: Duration::hours(20),
            weekly: Duration::hours(20 * 7),
        }
    }
}

impl WiltThresholds {
    pub fn for_frequency(&self, frequency: Frequency) -> Duration {
        match frequency {
            Frequency::Daily => self.daily,
            Frequency::Weekly => self.weekly,
        }
    }
}

/// Store patch and revive flag produced by a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmTransition {
    pub changes: HabitChanges,
    pub revived: bool,
}

/// Compute what confirming `habit` at `as_of` changes.
///
/// Duplicate suppression is not checked here; callers consult the
/// completion ledger first. A back-dated `as_of` never moves
/// `last_confirmed_at` backwards.
pub fn confirm_transition(habit: &Habit, as_of: DateTime<Utc>) -> ConfirmTransition {
    let revived = habit.plant_state == PlantState::Wilting;
    let last_confirmed_at = habit.last_confirmed_at.map_or(as_of, |prev| prev.max(as_of));
    ConfirmTransition {
        changes: HabitChanges {
            last_confirmed_at: Some(last_confirmed_at),
            plant_state: revived.then_some(PlantState::Flourishing),
            ..HabitChanges::default()
        },
        revived,
    }
}

impl Habit {
    /// Anchor for elapsed-time computations.
    pub fn last_confirmed_or_created(&self) -> DateTime<Utc> {
        self.last_confirmed_at.unwrap_or(self.created_at)
    }

    pub fn elapsed_since_confirmed(&self, as_of: DateTime<Utc>) -> Duration {
        as_of - self.last_confirmed_or_created()
    }

    /// Whether the sweeper should wilt this habit at `as_of`.
    pub fn is_wilt_due(&self, as_of: DateTime<Utc>, thresholds: &WiltThresholds) -> bool {
        self.plant_state == PlantState::Flourishing
            && self.elapsed_since_confirmed(as_of) >= thresholds.for_frequency(self.frequency)
    }

    /// Confirm in place. Returns `true` when the plant was revived.
    pub fn confirm(&mut self, as_of: DateTime<Utc>) -> bool {
        let transition = confirm_transition(self, as_of);
        self.apply(&transition.changes);
        transition.revived
    }

    /// Wilt in place if due. Returns `true` when the state changed.
    pub fn wilt(&mut self, as_of: DateTime<Utc>, thresholds: &WiltThresholds) -> bool {
        if !self.is_wilt_due(as_of, thresholds) {
            return false;
        }
        self.plant_state = PlantState::Wilting;
        true
    }
}
