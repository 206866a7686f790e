//! Node harness
//!
//! Wires a `Node` to the simulated clock, authority and peripherals, and
//! exposes the moves a scenario makes: present a tag, let time pass, fire
//! a timer, run a loop iteration.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use keyward_cache::MemoryStore;
use keyward_core::{Clock, DeviceMode, NodeConfig, TagId, Timestamp, Trigger, TriggerCell, TriggerState};
use keyward_runtime::{Node, NodeParts};
use keyward_wire::TagFrame;

use crate::{RecordingContact, RecordingStatus, SimAuthority, SimClock, SimTicker};

pub const SIM_HOST: &str = "https://authority.test";
pub const SIM_SECRET: &str = "sim-secret";

/// Configuration pointing at the simulated authority
pub fn sim_config(mode: DeviceMode) -> NodeConfig {
    NodeConfig {
        device_name: format!("sim-{mode}"),
        mode,
        host: SIM_HOST.to_string(),
        secret: SIM_SECRET.to_string(),
        ..Default::default()
    }
}

/// A started node plus handles on everything it talks to
pub struct NodeHarness {
    pub node: Node,
    pub clock: Arc<SimClock>,
    pub authority: SimAuthority,
    pub store: MemoryStore,
    pub contact: RecordingContact,
    pub status: RecordingStatus,
    pub checkin_timer: SimTicker,
    pub heartbeat_timer: SimTicker,
    pub reader: VecDeque<u8>,
}

impl NodeHarness {
    pub fn new(config: NodeConfig, authority: SimAuthority, store: MemoryStore) -> Self {
        let clock = Arc::new(SimClock::new());
        let cell = TriggerCell::new();
        let contact = RecordingContact::new();
        let status = RecordingStatus::new();
        let checkin_timer = SimTicker::new(cell.clone(), Trigger::Checkin);
        let heartbeat_timer = SimTicker::new(cell.clone(), Trigger::SessionHeartbeat);

        let parts = NodeParts {
            transport: Box::new(authority.clone()),
            store: Box::new(store.clone()),
            contact: Box::new(contact.clone()),
            status: Box::new(status.clone()),
            checkin_timer: Box::new(checkin_timer.clone()),
            heartbeat_timer: Box::new(heartbeat_timer.clone()),
        };
        let shared: Arc<dyn Clock> = clock.clone();
        let mut node = Node::new(config, shared, cell, parts);
        node.start();

        NodeHarness {
            node,
            clock,
            authority,
            store,
            contact,
            status,
            checkin_timer,
            heartbeat_timer,
            reader: VecDeque::new(),
        }
    }

    /// Harness with default timings for `mode` and an empty cache
    pub fn for_mode(mode: DeviceMode, authority: SimAuthority) -> Self {
        Self::new(sim_config(mode), authority, MemoryStore::new())
    }

    pub fn tick(&mut self) -> TriggerState {
        self.node.tick(&mut self.reader)
    }

    /// Put a valid frame for `tag` on the reader and run one iteration
    pub fn present(&mut self, tag: u32) -> TriggerState {
        self.reader
            .extend(TagFrame::for_tag(TagId(tag)).to_bytes());
        self.tick()
    }

    /// Put raw bytes on the reader and run one iteration
    pub fn present_raw(&mut self, bytes: &[u8]) -> TriggerState {
        self.reader.extend(bytes.iter().copied());
        self.tick()
    }

    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    pub fn advance_to(&self, millis: u64) {
        self.clock.set(Timestamp(millis));
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Fire the check-in timer and run one iteration
    pub fn fire_checkin(&mut self) -> TriggerState {
        self.checkin_timer.fire();
        self.tick()
    }

    /// Fire the heartbeat timer and run one iteration
    pub fn fire_heartbeat(&mut self) -> TriggerState {
        self.heartbeat_timer.fire();
        self.tick()
    }

    /// Tick until nothing is pending, at most `limit` times
    pub fn settle(&mut self, limit: usize) -> Vec<TriggerState> {
        let mut serviced = Vec::new();
        for _ in 0..limit {
            match self.tick() {
                TriggerState::Idle => break,
                state => serviced.push(state),
            }
        }
        serviced
    }
}
