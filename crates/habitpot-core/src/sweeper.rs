//! Scheduled wilt sweeper.
//!
//! A sweep walks every flourishing habit, wilts the ones whose inactivity
//! reached their frequency's threshold, then queues one reminder per user
//! listing all of that user's wilting plants.
//!
//! [`WiltSweeper::spawn`] drives sweeps from a tokio interval. Each sweep
//! runs on the blocking pool since the stores are synchronous. Only one
//! sweep runs at a time; an overlapping call returns [`SweepOutcome::Skipped`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::habit::{Frequency, Habit, HabitChanges, HabitFilter, PlantState, WiltThresholds};
use crate::reminder::ReminderSink;
use crate::storage::{Config, RecordStore};

#[derive(Debug, Clone)]
pub struct SweeperSettings {
    pub thresholds: WiltThresholds,
    pub emit_reminders: bool,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            thresholds: WiltThresholds::default(),
            emit_reminders: true,
        }
    }
}

impl SweeperSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds(),
            emit_reminders: config.sweeper.emit_reminders,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Instant the thresholds were measured against.
    pub as_of: DateTime<Utc>,
    pub examined: usize,
    pub wilted: usize,
    pub failed: usize,
    pub daily_wilted: usize,
    pub weekly_wilted: usize,
    pub reminded_users: Vec<String>,
    /// Set when a stop request cut the habit walk short.
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was already running.
    Skipped,
}

pub struct WiltSweeper {
    habits: Arc<dyn RecordStore<Habit>>,
    reminders: Arc<dyn ReminderSink>,
    clock: Arc<dyn Clock>,
    settings: SweeperSettings,
    running: AtomicBool,
    stop: AtomicBool,
}

/// Clears the running flag when a sweep ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WiltSweeper {
    pub fn new(
        habits: Arc<dyn RecordStore<Habit>>,
        reminders: Arc<dyn ReminderSink>,
        clock: Arc<dyn Clock>,
        settings: SweeperSettings,
    ) -> Self {
        Self {
            habits,
            reminders,
            clock,
            settings,
            running: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    pub fn from_backend<B>(backend: Arc<B>, settings: SweeperSettings) -> Self
    where
        B: RecordStore<Habit> + ReminderSink + 'static,
    {
        Self::new(backend.clone(), backend, Arc::new(SystemClock), settings)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &SweeperSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask an in-flight sweep to stop after the current habit. Later sweeps
    /// stop immediately.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Run one sweep measured at `as_of` (the clock's now when `None`).
    ///
    /// # Errors
    /// Returns `SweepAborted` when the habit store cannot be read. Nothing
    /// from the aborted cycle is reported.
    pub fn sweep_once(&self, as_of: Option<DateTime<Utc>>) -> Result<SweepOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sweep already in progress, skipping");
            return Ok(SweepOutcome::Skipped);
        }
        let _guard = RunningGuard(&self.running);

        self.run(as_of).map(SweepOutcome::Completed)
    }

    fn run(&self, as_of: Option<DateTime<Utc>>) -> Result<SweepReport> {
        let started_at = self.clock.now();
        let as_of = as_of.unwrap_or(started_at);
        let thresholds = &self.settings.thresholds;

        let flourishing = self
            .habits
            .select(&HabitFilter::in_state(PlantState::Flourishing))
            .map_err(|e| {
                error!(error = %e, "sweep aborted: cannot read flourishing habits");
                CoreError::SweepAborted(e)
            })?;

        let (daily, weekly): (Vec<Habit>, Vec<Habit>) = flourishing
            .into_iter()
            .partition(|h| h.frequency == Frequency::Daily);

        let mut report = SweepReport {
            started_at,
            finished_at: started_at,
            as_of,
            examined: daily.len() + weekly.len(),
            wilted: 0,
            failed: 0,
            daily_wilted: 0,
            weekly_wilted: 0,
            reminded_users: Vec::new(),
            interrupted: false,
        };

        for habit in daily.iter().chain(weekly.iter()) {
            if self.stop.load(Ordering::Acquire) {
                info!("sweep interrupted by stop request");
                report.interrupted = true;
                break;
            }
            if !habit.is_wilt_due(as_of, thresholds) {
                continue;
            }

            let filter = HabitFilter::by_id(&habit.id).with_state(PlantState::Flourishing);
            match self.habits.update(&filter, &HabitChanges::wilt()) {
                Ok(updated) if updated.is_empty() => {
                    debug!(habit_id = %habit.id, "habit changed during sweep, left alone");
                }
                Ok(_) => {
                    debug!(
                        habit_id = %habit.id,
                        elapsed_hours = habit.elapsed_since_confirmed(as_of).num_hours(),
                        "habit wilted"
                    );
                    report.wilted += 1;
                    match habit.frequency {
                        Frequency::Daily => report.daily_wilted += 1,
                        Frequency::Weekly => report.weekly_wilted += 1,
                    }
                }
                Err(e) => {
                    warn!(habit_id = %habit.id, error = %e, "failed to wilt habit, skipping");
                    report.failed += 1;
                }
            }
        }

        if self.settings.emit_reminders && !report.interrupted {
            report.reminded_users = self.emit_reminders(as_of)?;
        }

        report.finished_at = self.clock.now();
        info!(
            daily_threshold_hours = thresholds.daily.num_hours(),
            weekly_threshold_hours = thresholds.weekly.num_hours(),
            examined = report.examined,
            daily_wilted = report.daily_wilted,
            weekly_wilted = report.weekly_wilted,
            failed = report.failed,
            reminded = report.reminded_users.len(),
            "wilt sweep finished"
        );
        Ok(report)
    }

    /// Queue one reminder per user with wilting plants. Returns the users a
    /// reminder was queued for.
    fn emit_reminders(&self, as_of: DateTime<Utc>) -> Result<Vec<String>> {
        let wilting = self
            .habits
            .select(&HabitFilter::in_state(PlantState::Wilting))
            .map_err(|e| {
                error!(error = %e, "sweep aborted: cannot read wilting habits");
                CoreError::SweepAborted(e)
            })?;

        let mut reminded = Vec::new();
        for (user_id, names) in group_names_by_user(&wilting) {
            match self.reminders.push(&user_id, &names, as_of) {
                Ok(()) => reminded.push(user_id),
                Err(e) => warn!(user_id = %user_id, error = %e, "failed to queue reminder"),
            }
        }
        Ok(reminded)
    }

    /// Start sweeping every `period` until the handle is shut down. The
    /// first sweep runs immediately.
    pub fn spawn(self: Arc<Self>, period: Duration) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = period.max(Duration::from_millis(1));
        let sweeper = self.clone();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = period.as_secs(), "wilt sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let s = sweeper.clone();
                        match tokio::task::spawn_blocking(move || s.sweep_once(None)).await {
                            Ok(Ok(SweepOutcome::Completed(_))) => {}
                            Ok(Ok(SweepOutcome::Skipped)) => debug!("tick skipped, sweep still running"),
                            Ok(Err(e)) => error!(error = %e, "sweep failed, retrying next tick"),
                            Err(e) => error!(error = %e, "sweep task panicked"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("wilt sweeper stopped");
        });

        SweepHandle {
            sweeper: self,
            shutdown_tx,
            join,
        }
    }
}

/// Group wilting habits by user, deduplicating names and keeping the order
/// in which users and names were first seen.
fn group_names_by_user(habits: &[Habit]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for habit in habits {
        let slot = *index.entry(habit.user_id.as_str()).or_insert_with(|| {
            groups.push((habit.user_id.clone(), Vec::new()));
            groups.len() - 1
        });
        let names = &mut groups[slot].1;
        if !names.contains(&habit.name) {
            names.push(habit.name.clone());
        }
    }
    groups
}

/// Handle to a running sweeper loop.
pub struct SweepHandle {
    sweeper: Arc<WiltSweeper>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the loop and wait for it. An in-flight sweep finishes the habit
    /// it is on and skips the rest.
    pub async fn shutdown(self) {
        self.sweeper.request_stop();
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "sweeper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
