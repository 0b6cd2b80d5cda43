//! # habitpot core
//!
//! Habit tracking where each habit is a plant. Confirming a habit in its
//! period ("watering") keeps the plant flourishing; going too long without a
//! confirmation lets it wilt, and the next confirmation revives it.
//!
//! ## Architecture
//!
//! - **Habit model**: [`Habit`], [`Frequency`], [`PlantState`] and the
//!   confirm/wilt transitions in [`habit`]
//! - **Period keys**: calendar-day and ISO-week bucketing in [`period`]
//! - **Completion ledger**: append-only confirmation records and duplicate
//!   detection in [`ledger`]
//! - **Tracker**: the user-facing operations in [`HabitTracker`]
//! - **Sweeper**: the scheduled wilt pass in [`WiltSweeper`]
//! - **Storage**: [`RecordStore`] over SQLite or memory, plus TOML [`Config`]
//!
//! All timestamps are UTC.

pub mod clock;
pub mod error;
pub mod habit;
pub mod ledger;
pub mod period;
pub mod reminder;
pub mod storage;
pub mod sweeper;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, Result, StoreError, ValidationError};
pub use habit::{
    ConfirmOutcome, Frequency, Habit, HabitChanges, HabitFilter, HabitPatch, HabitView,
    PlantState, WiltThresholds,
};
pub use ledger::{CompletionFilter, CompletionLedger, CompletionRecord, StoreLedger};
pub use period::{period_key, period_key_at, period_key_str, week_bounds};
pub use reminder::{MemoryReminders, ReminderEntry, ReminderSink};
pub use storage::{Config, Database, MemoryStore, Record, RecordStore, SqliteStore};
pub use sweeper::{SweepHandle, SweepOutcome, SweepReport, SweeperSettings, WiltSweeper};
pub use tracker::{CompletionHistory, HabitTracker};
