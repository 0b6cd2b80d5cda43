//! SQLite-backed record store.
//!
//! Provides persistent storage for:
//! - Habits and their plant state
//! - The append-only completion ledger
//! - The pending reminder queue
//!
//! Timestamps are stored as RFC 3339 text, dates as `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::convert::Infallible;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, migrations, RecordStore};
use crate::error::StoreError;
use crate::habit::{Frequency, Habit, HabitChanges, HabitFilter, PlantState};
use crate::ledger::{CompletionFilter, CompletionRecord};
use crate::reminder::{ReminderEntry, ReminderSink};

const HABIT_COLUMNS: &str =
    "id, user_id, name, frequency, plant_state, last_confirmed_at, created_at";
const COMPLETION_COLUMNS: &str = "habit_id, user_id, period_key, completion_date, confirmed_at";

// === Helper Functions ===

fn decode_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_error(idx, format!("bad timestamp '{raw}': {e}")))
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| decode_error(idx, format!("bad date '{raw}': {e}")))
}

fn row_to_habit(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let frequency: String = row.get(3)?;
    let plant_state: String = row.get(4)?;
    let last_confirmed_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(Habit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        frequency: frequency
            .parse::<Frequency>()
            .map_err(|e| decode_error(3, e.to_string()))?,
        plant_state: PlantState::parse(&plant_state)
            .ok_or_else(|| decode_error(4, format!("unknown plant state '{plant_state}'")))?,
        last_confirmed_at: last_confirmed_at
            .as_deref()
            .map(|raw| parse_timestamp(5, raw))
            .transpose()?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

fn row_to_completion(row: &Row<'_>) -> rusqlite::Result<CompletionRecord> {
    let completion_date: String = row.get(3)?;
    let confirmed_at: String = row.get(4)?;
    Ok(CompletionRecord {
        habit_id: row.get(0)?,
        user_id: row.get(1)?,
        period_key: row.get(2)?,
        completion_date: parse_date(3, &completion_date)?,
        confirmed_at: parse_timestamp(4, &confirmed_at)?,
    })
}

fn habit_where(filter: &HabitFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(ref id) = filter.id {
        clauses.push("id = ?");
        values.push(Value::Text(id.clone()));
    }
    if let Some(ref user_id) = filter.user_id {
        clauses.push("user_id = ?");
        values.push(Value::Text(user_id.clone()));
    }
    if let Some(frequency) = filter.frequency {
        clauses.push("frequency = ?");
        values.push(Value::Text(frequency.as_str().to_string()));
    }
    if let Some(state) = filter.plant_state {
        clauses.push("plant_state = ?");
        values.push(Value::Text(state.as_str().to_string()));
    }
    (where_sql(&clauses), values)
}

fn completion_where(filter: &CompletionFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(ref habit_id) = filter.habit_id {
        clauses.push("habit_id = ?");
        values.push(Value::Text(habit_id.clone()));
    }
    if let Some(ref key) = filter.period_key {
        clauses.push("period_key = ?");
        values.push(Value::Text(key.clone()));
    }
    if let Some(since) = filter.since {
        clauses.push("completion_date >= ?");
        values.push(Value::Text(since.format("%Y-%m-%d").to_string()));
    }
    if let Some(at) = filter.confirmed_at {
        clauses.push("confirmed_at = ?");
        values.push(Value::Text(at.to_rfc3339()));
    }
    (where_sql(&clauses), values)
}

fn where_sql(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

/// SQLite database implementing every record store the core needs.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/habitpot.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Self::open_at(&dir.join("habitpot.db"))
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against the underlying connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        Ok(f(&*self.conn()?)?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unreachable("database connection lock poisoned".into()))
    }
}

impl RecordStore<Habit> for Database {
    fn insert(&self, record: Habit) -> Result<Habit, StoreError> {
        self.conn()?.execute(
            &format!("INSERT INTO habits ({HABIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                record.id,
                record.user_id,
                record.name,
                record.frequency.as_str(),
                record.plant_state.as_str(),
                record.last_confirmed_at.map(|t| t.to_rfc3339()),
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    fn update(&self, filter: &HabitFilter, patch: &HabitChanges) -> Result<Vec<Habit>, StoreError> {
        if patch.is_empty() {
            return self.select(filter);
        }

        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(ref name) = patch.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(frequency) = patch.frequency {
            sets.push("frequency = ?");
            values.push(Value::Text(frequency.as_str().to_string()));
        }
        if let Some(state) = patch.plant_state {
            sets.push("plant_state = ?");
            values.push(Value::Text(state.as_str().to_string()));
        }
        if let Some(at) = patch.last_confirmed_at {
            sets.push("last_confirmed_at = ?");
            values.push(Value::Text(at.to_rfc3339()));
        }

        let (where_clause, where_values) = habit_where(filter);
        values.extend(where_values);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "UPDATE habits SET {}{where_clause} RETURNING {HABIT_COLUMNS}",
            sets.join(", ")
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_habit)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn select(&self, filter: &HabitFilter) -> Result<Vec<Habit>, StoreError> {
        let (where_clause, values) = habit_where(filter);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits{where_clause} ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_habit)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete(&self, filter: &HabitFilter) -> Result<Vec<Habit>, StoreError> {
        let (where_clause, values) = habit_where(filter);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "DELETE FROM habits{where_clause} RETURNING {HABIT_COLUMNS}"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_habit)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl RecordStore<CompletionRecord> for Database {
    fn insert(&self, record: CompletionRecord) -> Result<CompletionRecord, StoreError> {
        self.conn()?.execute(
            &format!("INSERT INTO habit_completions ({COMPLETION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
            params![
                record.habit_id,
                record.user_id,
                record.period_key,
                record.completion_date.format("%Y-%m-%d").to_string(),
                record.confirmed_at.to_rfc3339(),
            ],
        )?;
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
        let (where_clause, values) = completion_where(filter);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM habit_completions{where_clause} ORDER BY id"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_completion)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete(&self, filter: &CompletionFilter) -> Result<Vec<CompletionRecord>, StoreError> {
        let (where_clause, values) = completion_where(filter);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "DELETE FROM habit_completions{where_clause} RETURNING {COMPLETION_COLUMNS}"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_completion)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl ReminderSink for Database {
    fn push(
        &self,
        user_id: &str,
        habit_names: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let names = serde_json::to_string(habit_names).map_err(|e| StoreError::Corrupt {
            table: "reminders".into(),
            message: e.to_string(),
        })?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let newest: Option<String> = tx
            .query_row(
                "SELECT habit_names FROM reminders WHERE user_id = ?1 ORDER BY id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if newest.as_deref() == Some(names.as_str()) {
            return Ok(());
        }
        tx.execute(
            "INSERT INTO reminders (user_id, habit_names, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, names, at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn drain(&self, user_id: &str) -> Result<Vec<ReminderEntry>, StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let raw = {
            let mut stmt = tx.prepare(
                "SELECT habit_names, created_at FROM reminders WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.execute("DELETE FROM reminders WHERE user_id = ?1", params![user_id])?;
        tx.commit()?;

        raw.into_iter()
            .map(|(names, created_at)| -> Result<ReminderEntry, StoreError> {
                let habit_names: Vec<String> =
                    serde_json::from_str(&names).map_err(|e| StoreError::Corrupt {
                        table: "reminders".into(),
                        message: e.to_string(),
                    })?;
                Ok(ReminderEntry {
                    user_id: user_id.to_string(),
                    habit_names,
                    created_at: parse_timestamp(1, &created_at)?,
                })
            })
            .collect()
    }

    fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.conn()?
            .execute("DELETE FROM reminders WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }
}
