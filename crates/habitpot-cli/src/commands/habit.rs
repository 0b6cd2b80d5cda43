use chrono::{DateTime, Utc};
use clap::Subcommand;
use habitpot_core::{Config, Frequency, HabitPatch};

use super::{open_tracker, print_json};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a habit
    Create {
        /// Habit name
        name: String,
        /// daily or weekly
        #[arg(long, short, default_value = "daily")]
        frequency: String,
    },
    /// List habits with their completion flags
    List,
    /// Show one habit
    Get {
        /// Habit ID
        id: String,
    },
    /// Confirm (water) a habit for the current period
    Confirm {
        /// Habit ID
        id: String,
        /// Confirmation time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Rename a habit or change its frequency
    Update {
        /// Habit ID
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short)]
        frequency: Option<String>,
    },
    /// Delete a habit
    Delete {
        /// Habit ID
        id: String,
    },
    /// Show recent confirmations
    History {
        /// Habit ID
        id: String,
        /// Days to look back (defaults to history.default_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

pub fn run(user: &str, action: HabitAction) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = open_tracker()?;

    match action {
        HabitAction::Create { name, frequency } => {
            let frequency: Frequency = frequency.parse()?;
            let habit = tracker.create_habit(user, &name, frequency)?;
            print_json(&habit)?;
        }
        HabitAction::List => {
            print_json(&tracker.get_habits(user)?)?;
        }
        HabitAction::Get { id } => {
            print_json(&tracker.get_habit(user, &id)?)?;
        }
        HabitAction::Confirm { id, at } => {
            let outcome = tracker.confirm_habit(user, &id, at)?;
            print_json(&outcome)?;
        }
        HabitAction::Update {
            id,
            name,
            frequency,
        } => {
            let patch = HabitPatch {
                name,
                frequency: frequency.as_deref().map(str::parse).transpose()?,
            };
            print_json(&tracker.update_habit(user, &id, patch)?)?;
        }
        HabitAction::Delete { id } => {
            tracker.delete_habit(user, &id)?;
            println!("deleted {id}");
        }
        HabitAction::History { id, days } => {
            let days = days.unwrap_or_else(|| Config::load_or_default().history.default_days);
            print_json(&tracker.get_completion_history(user, &id, days)?)?;
        }
    }
    Ok(())
}
