//! Trigger state and the timer-to-loop signal cell
//!
//! Timer callbacks must not touch node state. They post a trigger bit into
//! a `TriggerCell` (a single atomic word) and the control loop drains the
//! cell into its own `TriggerSet`. The loop then services exactly one
//! trigger per iteration, in `Trigger::PRIORITY` order.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Deferred work kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Trigger {
    Checkin = 0b0001,
    SessionHeartbeat = 0b0010,
    CacheRefresh = 0b0100,
    OfflineFallback = 0b1000,
}

impl Trigger {
    /// Service order when several triggers are pending. Follow-up work set
    /// by a handler goes before new timer work.
    pub const PRIORITY: [Trigger; 4] = [
        Trigger::OfflineFallback,
        Trigger::CacheRefresh,
        Trigger::SessionHeartbeat,
        Trigger::Checkin,
    ];

    #[inline]
    pub fn bit(self) -> u8 {
        self as u8
    }
}

/// What the current loop iteration is servicing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TriggerState {
    #[default]
    Idle,
    CheckinDue,
    SessionHeartbeatDue,
    CacheRefreshDue,
    OfflineFallback,
}

impl From<Trigger> for TriggerState {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Checkin => TriggerState::CheckinDue,
            Trigger::SessionHeartbeat => TriggerState::SessionHeartbeatDue,
            Trigger::CacheRefresh => TriggerState::CacheRefreshDue,
            Trigger::OfflineFallback => TriggerState::OfflineFallback,
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerState::Idle => "idle",
            TriggerState::CheckinDue => "checkin-due",
            TriggerState::SessionHeartbeatDue => "session-heartbeat-due",
            TriggerState::CacheRefreshDue => "cache-refresh-due",
            TriggerState::OfflineFallback => "offline-fallback",
        };
        f.write_str(name)
    }
}

/// Loop-owned set of pending triggers
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerSet(u8);

impl TriggerSet {
    pub const EMPTY: TriggerSet = TriggerSet(0);

    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        TriggerSet(bits & 0b1111)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn insert(&mut self, trigger: Trigger) {
        self.0 |= trigger.bit();
    }

    #[inline]
    pub fn remove(&mut self, trigger: Trigger) {
        self.0 &= !trigger.bit();
    }

    #[inline]
    pub fn contains(self, trigger: Trigger) -> bool {
        self.0 & trigger.bit() != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn merge(&mut self, other: TriggerSet) {
        self.0 |= other.0;
    }

    /// Remove and return the highest-priority pending trigger
    pub fn take_next(&mut self) -> Option<Trigger> {
        let next = Trigger::PRIORITY
            .into_iter()
            .find(|trigger| self.contains(*trigger))?;
        self.remove(next);
        Some(next)
    }
}

impl fmt::Debug for TriggerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending: Vec<_> = Trigger::PRIORITY
            .into_iter()
            .filter(|t| self.contains(*t))
            .collect();
        f.debug_tuple("TriggerSet").field(&pending).finish()
    }
}

/// Single-word signal cell shared with timer callbacks
#[derive(Clone, Debug, Default)]
pub struct TriggerCell {
    bits: Arc<AtomicU8>,
}

impl TriggerCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a trigger. Safe from any thread; performs no other work.
    #[inline]
    pub fn post(&self, trigger: Trigger) {
        self.bits.fetch_or(trigger.bit(), Ordering::AcqRel);
    }

    /// Take everything posted since the last drain
    #[inline]
    pub fn drain(&self) -> TriggerSet {
        TriggerSet::from_bits(self.bits.swap(0, Ordering::AcqRel))
    }

    /// Pending triggers without draining
    pub fn peek(&self) -> TriggerSet {
        TriggerSet::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_take_next_follows_priority() {
        let mut set = TriggerSet::EMPTY;
        set.insert(Trigger::Checkin);
        set.insert(Trigger::SessionHeartbeat);
        set.insert(Trigger::CacheRefresh);

        assert_eq!(set.take_next(), Some(Trigger::CacheRefresh));
        assert_eq!(set.take_next(), Some(Trigger::SessionHeartbeat));
        assert_eq!(set.take_next(), Some(Trigger::Checkin));
        assert_eq!(set.take_next(), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_cell_posts_coalesce() {
        let cell = TriggerCell::new();
        cell.post(Trigger::Checkin);
        cell.post(Trigger::Checkin);
        cell.post(Trigger::SessionHeartbeat);

        let drained = cell.drain();
        assert!(drained.contains(Trigger::Checkin));
        assert!(drained.contains(Trigger::SessionHeartbeat));
        assert!(!drained.contains(Trigger::CacheRefresh));
        assert!(cell.peek().is_empty());
    }

    #[test]
    fn test_cell_shared_across_threads() {
        let cell = TriggerCell::new();
        let remote = cell.clone();
        let handle = std::thread::spawn(move || remote.post(Trigger::Checkin));
        handle.join().unwrap();
        assert!(cell.drain().contains(Trigger::Checkin));
    }

    #[test]
    fn test_trigger_state_mapping() {
        assert_eq!(TriggerState::from(Trigger::OfflineFallback), TriggerState::OfflineFallback);
        assert_eq!(TriggerState::from(Trigger::Checkin).to_string(), "checkin-due");
        assert_eq!(TriggerState::default(), TriggerState::Idle);
    }

    proptest! {
        #[test]
        fn prop_drain_services_each_trigger_once(bits in 0u8..16) {
            let mut set = TriggerSet::from_bits(bits);
            let mut seen = Vec::new();
            while let Some(trigger) = set.take_next() {
                seen.push(trigger);
            }
            prop_assert_eq!(seen.len() as u32, bits.count_ones());
            let expected: Vec<_> = Trigger::PRIORITY
                .into_iter()
                .filter(|t| bits & t.bit() != 0)
                .collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
