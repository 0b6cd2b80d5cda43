use clap::Subcommand;

use super::{open_tracker, print_json};

#[derive(Subcommand)]
pub enum ReminderAction {
    /// Show and consume pending reminders
    Show {
        /// Print the reminder text instead of JSON
        #[arg(long)]
        plain: bool,
    },
    /// Drop pending reminders without showing them
    Clear,
}

pub fn run(user: &str, action: ReminderAction) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = open_tracker()?;

    match action {
        ReminderAction::Show { plain } => {
            let entries = tracker.reminders(user)?;
            if plain {
                for entry in &entries {
                    println!("{}", entry.message());
                }
            } else {
                print_json(&entries)?;
            }
        }
        ReminderAction::Clear => {
            tracker.clear_reminders(user)?;
            println!("reminders cleared");
        }
    }
    Ok(())
}
