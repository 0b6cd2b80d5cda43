//! Habit data model.
//!
//! A habit is a recurring commitment visualized as a plant. Its health
//! (`PlantState`) is driven by the lifecycle rules in [`lifecycle`].

mod lifecycle;

pub use lifecycle::{confirm_transition, ConfirmTransition, WiltThresholds};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;
use crate::storage::Record;

/// How often a habit must be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            _ => Err(CoreError::InvalidFrequency(s.to_string())),
        }
    }
}

/// Health of the plant representing a habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlantState {
    Flourishing,
    Wilting,
}

impl PlantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlantState::Flourishing => "flourishing",
            PlantState::Wilting => "wilting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flourishing" => Some(PlantState::Flourishing),
            "wilting" => Some(PlantState::Wilting),
            _ => None,
        }
    }
}

impl fmt::Display for PlantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub frequency: Frequency,
    pub plant_state: PlantState,
    /// `None` until the first confirmation.
    pub last_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    /// A freshly created habit: flourishing, never confirmed.
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        frequency: Frequency,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            frequency,
            plant_state: PlantState::Flourishing,
            last_confirmed_at: None,
            created_at,
        }
    }

    /// Apply a store-level patch in place.
    pub fn apply(&mut self, changes: &HabitChanges) {
        if let Some(ref name) = changes.name {
            self.name = name.clone();
        }
        if let Some(frequency) = changes.frequency {
            self.frequency = frequency;
        }
        if let Some(state) = changes.plant_state {
            self.plant_state = state;
        }
        if let Some(at) = changes.last_confirmed_at {
            self.last_confirmed_at = Some(at);
        }
    }
}

/// Key filter over habits. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitFilter {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub frequency: Option<Frequency>,
    pub plant_state: Option<PlantState>,
}

impl HabitFilter {
    pub fn owned(user_id: &str, habit_id: &str) -> Self {
        Self {
            id: Some(habit_id.to_string()),
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_id(habit_id: &str) -> Self {
        Self {
            id: Some(habit_id.to_string()),
            ..Self::default()
        }
    }

    pub fn in_state(state: PlantState) -> Self {
        Self {
            plant_state: Some(state),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: PlantState) -> Self {
        self.plant_state = Some(state);
        self
    }

    pub fn matches(&self, habit: &Habit) -> bool {
        self.id.as_deref().map_or(true, |id| habit.id == id)
            && self.user_id.as_deref().map_or(true, |u| habit.user_id == u)
            && self.frequency.map_or(true, |f| habit.frequency == f)
            && self.plant_state.map_or(true, |s| habit.plant_state == s)
    }
}

/// Store-level patch. `None` fields are left untouched; `last_confirmed_at`
/// can only move forward to a value, never back to "never confirmed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitChanges {
    pub name: Option<String>,
    pub frequency: Option<Frequency>,
    pub plant_state: Option<PlantState>,
    pub last_confirmed_at: Option<DateTime<Utc>>,
}

impl HabitChanges {
    pub fn wilt() -> Self {
        Self {
            plant_state: Some(PlantState::Wilting),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.frequency.is_none()
            && self.plant_state.is_none()
            && self.last_confirmed_at.is_none()
    }
}

impl Record for Habit {
    type Filter = HabitFilter;
    type Patch = HabitChanges;
}

/// User-facing edit of a habit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub frequency: Option<Frequency>,
}

/// A habit together with its completion flags for the current period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitView {
    #[serde(flatten)]
    pub habit: Habit,
    pub is_completed_today: bool,
    pub is_completed_this_week: bool,
}

impl HabitView {
    /// Daily habits only ever report `is_completed_today`; weekly habits
    /// only `is_completed_this_week`.
    pub fn new(habit: Habit, completed: bool) -> Self {
        let (today, week) = match habit.frequency {
            Frequency::Daily => (completed, false),
            Frequency::Weekly => (false, completed),
        };
        Self {
            habit,
            is_completed_today: today,
            is_completed_this_week: week,
        }
    }
}

/// Result of confirming a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub habit: HabitView,
    pub revived: bool,
    pub already_completed: bool,
    pub period_key: String,
    /// `false` when the ledger append failed; duplicate suppression for this
    /// period then falls back to `last_confirmed_at`.
    pub ledger_recorded: bool,
}
