pub mod config;
pub mod habit;
pub mod reminder;
pub mod sweep;

use habitpot_core::{Database, HabitTracker};
use std::sync::Arc;

pub(crate) fn open_tracker() -> Result<HabitTracker, Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    Ok(HabitTracker::from_backend(db))
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
