//! Core error types for habitpot-core.
//!
//! This module defines the error hierarchy using thiserror. `CoreError` is
//! what user-facing operations return; `StoreError` is what record stores
//! and reminder sinks return and is wrapped by the core at the boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for habitpot-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Habit does not exist or is not owned by the caller. The two cases are
    /// never distinguished.
    #[error("Habit not found")]
    NotFound,

    /// Frequency outside {daily, weekly}.
    #[error("Invalid frequency '{0}': expected 'daily' or 'weekly'")]
    InvalidFrequency(String),

    /// Backing store unreachable; the operation was aborted.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Completion ledger append failed. Swallowed by confirm.
    #[error("Completion ledger write failed: {0}")]
    LedgerWriteFailed(#[source] StoreError),

    /// Store unreachable mid-sweep; the cycle was discarded.
    #[error("Sweep aborted: {0}")]
    SweepAborted(#[source] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Record store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored value could not be decoded
    #[error("Corrupt record in '{table}': {message}")]
    Corrupt { table: String, message: String },

    /// Store is unreachable (connection dropped, lock poisoned, injected fault)
    #[error("Store unreachable: {0}")]
    Unreachable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty value
    #[error("'{0}' must not be empty")]
    Empty(String),

    /// Patch carried no fields
    #[error("No valid fields to update")]
    EmptyPatch,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::StoreUnavailable(err)
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_store_unavailable() {
        let err: CoreError = StoreError::Unreachable("down".into()).into();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
        assert_eq!(err.to_string(), "Store unavailable: Store unreachable: down");
    }

    #[test]
    fn not_found_message_does_not_mention_ownership() {
        assert_eq!(CoreError::NotFound.to_string(), "Habit not found");
    }

    #[test]
    fn rusqlite_missing_table_maps_to_query_failed() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn
            .execute("INSERT INTO nowhere (x) VALUES (1)", [])
            .unwrap_err();
        assert!(matches!(StoreError::from(err), StoreError::QueryFailed(_)));
    }
}
