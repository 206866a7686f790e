//! Simulated clock and recording peripherals

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keyward_core::{Clock, StatusSignal, Timestamp, Trigger, TriggerCell};
use keyward_runtime::{ContactOutput, StatusLight, Ticker};
use parking_lot::Mutex;

/// Manually advanced clock. Delays advance time instead of sleeping.
#[derive(Debug, Default)]
pub struct SimClock {
    millis: AtomicU64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time; never moves backwards
    pub fn set(&self, at: Timestamp) {
        self.millis.fetch_max(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }

    fn delay(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Contact output that records every level written
#[derive(Clone, Default)]
pub struct RecordingContact {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl RecordingContact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().clone()
    }

    pub fn level(&self) -> Option<bool> {
        self.levels.lock().last().copied()
    }

    /// Number of low-to-high transitions
    pub fn rising_edges(&self) -> usize {
        self.levels
            .lock()
            .windows(2)
            .filter(|w| !w[0] && w[1])
            .count()
    }
}

impl ContactOutput for RecordingContact {
    fn write(&mut self, level: bool) {
        self.levels.lock().push(level);
    }
}

/// Status light that records every signal shown
#[derive(Clone, Default)]
pub struct RecordingStatus {
    signals: Arc<Mutex<Vec<StatusSignal>>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<StatusSignal> {
        self.signals.lock().clone()
    }

    pub fn last(&self) -> Option<StatusSignal> {
        self.signals.lock().last().copied()
    }

    pub fn clear(&self) {
        self.signals.lock().clear();
    }
}

impl StatusLight for RecordingStatus {
    fn show(&mut self, signal: StatusSignal) {
        self.signals.lock().push(signal);
    }
}

/// Timer fired by hand. Firing a detached ticker posts nothing.
#[derive(Clone)]
pub struct SimTicker {
    cell: TriggerCell,
    trigger: Trigger,
    period: Arc<Mutex<Option<Duration>>>,
}

impl SimTicker {
    pub fn new(cell: TriggerCell, trigger: Trigger) -> Self {
        SimTicker {
            cell,
            trigger,
            period: Arc::default(),
        }
    }

    /// Post the trigger if attached; returns whether it was posted
    pub fn fire(&self) -> bool {
        let attached = self.period.lock().is_some();
        if attached {
            self.cell.post(self.trigger);
        }
        attached
    }

    pub fn period(&self) -> Option<Duration> {
        *self.period.lock()
    }
}

impl Ticker for SimTicker {
    fn attach(&mut self, period: Duration) {
        *self.period.lock() = Some(period);
    }

    fn detach(&mut self) {
        *self.period.lock() = None;
    }

    fn is_attached(&self) -> bool {
        self.period.lock().is_some()
    }
}
