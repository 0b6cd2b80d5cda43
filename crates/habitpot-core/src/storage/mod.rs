mod config;
pub mod database;
pub mod memory;
pub mod migrations;

pub use config::{Config, HistoryConfig, LoggingConfig, SweeperConfig, ThresholdsConfig};
pub use database::Database;
/// SQLite-backed store for habits, completions and reminders.
pub type SqliteStore = Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::{ConfigError, StoreError};

/// An entity kept in a [`RecordStore`], with the key filter and patch shapes
/// the store understands for it.
pub trait Record: Clone + Send + Sync + 'static {
    type Filter: Send + Sync;
    type Patch: Send + Sync;
}

/// Key-filtered CRUD over one entity type.
///
/// `update` and `delete` return the affected records as they are after the
/// operation (`update`) or were before it (`delete`). An empty vector means
/// nothing matched.
pub trait RecordStore<R: Record>: Send + Sync {
    fn insert(&self, record: R) -> Result<R, StoreError>;

    fn update(&self, filter: &R::Filter, patch: &R::Patch) -> Result<Vec<R>, StoreError>;

    fn select(&self, filter: &R::Filter) -> Result<Vec<R>, StoreError>;

    fn delete(&self, filter: &R::Filter) -> Result<Vec<R>, StoreError>;
}

/// Returns `~/.config/habitpot[-dev]/` based on HABITPOT_ENV.
///
/// Set HABITPOT_ENV=dev to use the development data directory, or
/// HABITPOT_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("HABITPOT_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("HABITPOT_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("habitpot-dev")
            } else {
                base_dir.join("habitpot")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
