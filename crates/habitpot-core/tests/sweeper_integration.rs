//! Sweeper failure handling, overlap guard and the scheduled loop.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use habitpot_core::{
    CoreError, Frequency, Habit, HabitChanges, HabitFilter, ManualClock, MemoryReminders,
    MemoryStore, PlantState, RecordStore, StoreError, SweepOutcome, SweeperSettings, WiltSweeper,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
}

/// Habit store that can refuse updates for chosen ids, refuse reads, or park
/// the first read until released.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing_ids: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

impl FlakyStore {
    fn habits(&self) -> &dyn RecordStore<Habit> {
        &self.inner
    }

    fn add(&self, user: &str, name: &str, frequency: Frequency) -> Habit {
        self.habits()
            .insert(Habit::new(user, name, frequency, t0()))
            .unwrap()
    }

    fn fail_updates_for(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    fn state_of(&self, id: &str) -> PlantState {
        self.habits().select(&HabitFilter::by_id(id)).unwrap()[0].plant_state
    }
}

impl RecordStore<Habit> for FlakyStore {
    fn insert(&self, record: Habit) -> Result<Habit, StoreError> {
        self.habits().insert(record)
    }

    fn update(&self, filter: &HabitFilter, patch: &HabitChanges) -> Result<Vec<Habit>, StoreError> {
        let failing = self.failing_ids.lock().unwrap();
        if filter.id.as_ref().is_some_and(|id| failing.contains(id)) {
            return Err(StoreError::Locked);
        }
        drop(failing);
        self.habits().update(filter, patch)
    }

    fn select(&self, filter: &HabitFilter) -> Result<Vec<Habit>, StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("connection refused".into()));
        }
        if let Some((entered, release)) = self.gate.lock().unwrap().take() {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        self.habits().select(filter)
    }

    fn delete(&self, filter: &HabitFilter) -> Result<Vec<Habit>, StoreError> {
        self.habits().delete(filter)
    }
}

fn sweeper_over(store: Arc<FlakyStore>, reminders: Arc<MemoryReminders>) -> WiltSweeper {
    WiltSweeper::new(
        store,
        reminders,
        Arc::new(ManualClock::new(t0() + Duration::hours(30))),
        SweeperSettings::default(),
    )
}

#[test]
fn one_failing_habit_does_not_stop_the_rest() {
    let store = Arc::new(FlakyStore::default());
    let a = store.add("u1", "A", Frequency::Daily);
    let b = store.add("u1", "B", Frequency::Daily);
    let c = store.add("u2", "C", Frequency::Daily);
    store.fail_updates_for(&b.id);

    let reminders = Arc::new(MemoryReminders::new());
    let sweeper = sweeper_over(store.clone(), reminders.clone());

    let SweepOutcome::Completed(report) = sweeper.sweep_once(None).unwrap() else {
        panic!("sweep skipped");
    };
    assert_eq!(report.examined, 3);
    assert_eq!(report.wilted, 2);
    assert_eq!(report.failed, 1);

    assert_eq!(store.state_of(&a.id), PlantState::Wilting);
    assert_eq!(store.state_of(&b.id), PlantState::Flourishing);
    assert_eq!(store.state_of(&c.id), PlantState::Wilting);
    assert_eq!(reminders.peek("u1")[0].habit_names, vec!["A".to_string()]);
}

#[test]
fn unreachable_store_aborts_the_cycle() {
    let store = Arc::new(FlakyStore::default());
    store.add("u1", "A", Frequency::Daily);
    store.unreachable.store(true, Ordering::SeqCst);

    let reminders = Arc::new(MemoryReminders::new());
    let sweeper = sweeper_over(store.clone(), reminders.clone());

    let err = sweeper.sweep_once(None).unwrap_err();
    assert!(matches!(err, CoreError::SweepAborted(StoreError::Unreachable(_))));
    assert!(!sweeper.is_running());
    assert!(reminders.peek("u1").is_empty());

    store.unreachable.store(false, Ordering::SeqCst);
    assert!(matches!(
        sweeper.sweep_once(None).unwrap(),
        SweepOutcome::Completed(ref r) if r.wilted == 1
    ));
}

#[test]
fn overlapping_sweep_is_skipped() {
    let store = Arc::new(FlakyStore::default());
    store.add("u1", "A", Frequency::Daily);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *store.gate.lock().unwrap() = Some((entered_tx, release_rx));

    let sweeper = Arc::new(sweeper_over(store, Arc::new(MemoryReminders::new())));
    let background = {
        let sweeper = sweeper.clone();
        std::thread::spawn(move || sweeper.sweep_once(None))
    };

    entered_rx.recv().unwrap();
    assert!(sweeper.is_running());
    assert_eq!(sweeper.sweep_once(None).unwrap(), SweepOutcome::Skipped);

    release_tx.send(()).unwrap();
    let outcome = background.join().unwrap().unwrap();
    assert!(matches!(outcome, SweepOutcome::Completed(ref r) if r.wilted == 1));
    assert!(!sweeper.is_running());
}

#[tokio::test]
async fn scheduled_loop_sweeps_and_shuts_down() {
    let store = Arc::new(MemoryStore::new());
    RecordStore::<Habit>::insert(&*store, Habit::new("u1", "A", Frequency::Daily, t0())).unwrap();

    let reminders = Arc::new(MemoryReminders::new());
    let sweeper = Arc::new(WiltSweeper::new(
        store.clone(),
        reminders.clone(),
        Arc::new(ManualClock::new(t0() + Duration::hours(21))),
        SweeperSettings::default(),
    ));

    let handle = sweeper.clone().spawn(std::time::Duration::from_millis(20));

    let mut wilted = false;
    for _ in 0..100 {
        let habits = RecordStore::<Habit>::select(&*store, &HabitFilter::default()).unwrap();
        if habits[0].plant_state == PlantState::Wilting {
            wilted = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(wilted, "sweeper never wilted the habit");
    assert!(!handle.is_finished());

    handle.shutdown().await;
    assert!(!sweeper.is_running());
    assert_eq!(reminders.peek("u1").len(), 1);
}
