use chrono::{DateTime, Utc};
use clap::Subcommand;
use habitpot_core::{Config, Database, SweepOutcome, SweeperSettings, WiltSweeper};
use std::sync::Arc;
use tracing::info;

use super::print_json;

#[derive(Subcommand)]
pub enum SweepAction {
    /// Run a single sweep and print its report
    Once {
        /// Measure inactivity as of this time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Sweep on the configured interval until interrupted
    Run {
        /// Override sweeper.interval_minutes
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
}

pub fn run(action: SweepAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Database::open()?);
    let sweeper = WiltSweeper::from_backend(db, SweeperSettings::from_config(&config));

    match action {
        SweepAction::Once { at } => match sweeper.sweep_once(at)? {
            SweepOutcome::Completed(report) => print_json(&report)?,
            SweepOutcome::Skipped => println!("sweep already running"),
        },
        SweepAction::Run { interval_minutes } => {
            let interval = match interval_minutes {
                Some(minutes) => interval_from_minutes(minutes)?,
                None => config.sweep_interval(),
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let handle = Arc::new(sweeper).spawn(interval);
                let signal = tokio::signal::ctrl_c().await;
                info!("shutting down sweeper");
                handle.shutdown().await;
                signal
            })?;
        }
    }
    Ok(())
}

fn interval_from_minutes(minutes: u64) -> Result<std::time::Duration, Box<dyn std::error::Error>> {
    if minutes == 0 {
        return Err("interval must be greater than zero".into());
    }
    Ok(std::time::Duration::from_secs(minutes.saturating_mul(60)))
}
