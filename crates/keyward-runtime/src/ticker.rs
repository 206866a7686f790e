//! Period timers on a background tokio runtime
//!
//! A timer task does nothing but post its trigger bit into the shared
//! `TriggerCell`; all work happens later on the control loop.

use std::time::Duration;

use keyward_core::{Trigger, TriggerCell};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::Ticker;

/// `Ticker` backed by a `tokio::time::interval` task
pub struct TokioTicker {
    handle: Handle,
    cell: TriggerCell,
    trigger: Trigger,
    task: Option<JoinHandle<()>>,
}

impl TokioTicker {
    pub fn new(handle: Handle, cell: TriggerCell, trigger: Trigger) -> Self {
        TokioTicker {
            handle,
            cell,
            trigger,
            task: None,
        }
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }
}

impl Ticker for TokioTicker {
    fn attach(&mut self, period: Duration) {
        self.detach();

        let cell = self.cell.clone();
        let trigger = self.trigger;
        // First fire one full period after attach.
        let task = self.handle.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                cell.post(trigger);
            }
        });
        self.task = Some(task);
        tracing::debug!(?trigger, ?period, "timer attached");
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(trigger = ?self.trigger, "timer detached");
        }
    }

    fn is_attached(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for TokioTicker {
    fn drop(&mut self) {
        self.detach();
    }
}
