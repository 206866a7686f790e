//! Device-mode strategies
//!
//! The node selects one strategy at startup and asks it what a swipe means.
//! Strategies only decide; the node carries the decision out.

use keyward_core::{DeviceMode, TagId};

use crate::{Session, SessionEnd};

/// What to do with a validated swipe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagAction {
    /// Ask for authorization, then apply the grant behaviour
    Authorize,
    /// End the active session without asking anyone
    EndSession(SessionEnd),
}

/// Contact behaviour on grant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantAction {
    /// Engage for the dwell time, then release
    Pulse,
    /// Engage and hold under a session
    Sustain,
}

pub trait ModeStrategy: Send {
    fn mode(&self) -> DeviceMode;

    /// Whether grants open sessions with heartbeats
    fn uses_session(&self) -> bool;

    fn on_tag(&self, tag: TagId, session: Option<&Session>) -> TagAction;

    fn on_grant(&self) -> GrantAction;
}

/// Door and key-locker behaviour: every swipe is checked, grants pulse
#[derive(Clone, Copy, Debug)]
pub struct PulseStrategy {
    mode: DeviceMode,
}

impl PulseStrategy {
    pub fn new(mode: DeviceMode) -> Self {
        PulseStrategy { mode }
    }
}

impl ModeStrategy for PulseStrategy {
    fn mode(&self) -> DeviceMode {
        self.mode
    }

    fn uses_session(&self) -> bool {
        false
    }

    fn on_tag(&self, _tag: TagId, _session: Option<&Session>) -> TagAction {
        TagAction::Authorize
    }

    fn on_grant(&self) -> GrantAction {
        GrantAction::Pulse
    }
}

/// Interlock behaviour
///
/// While a session is active any swipe ends it, whether from the holder or
/// from someone else, and no authorization is requested.
#[derive(Clone, Copy, Debug, Default)]
pub struct InterlockStrategy;

impl ModeStrategy for InterlockStrategy {
    fn mode(&self) -> DeviceMode {
        DeviceMode::Interlock
    }

    fn uses_session(&self) -> bool {
        true
    }

    fn on_tag(&self, tag: TagId, session: Option<&Session>) -> TagAction {
        match session {
            None => TagAction::Authorize,
            Some(s) if s.holder == tag => TagAction::EndSession(SessionEnd::Holder),
            Some(_) => TagAction::EndSession(SessionEnd::Bystander),
        }
    }

    fn on_grant(&self) -> GrantAction {
        GrantAction::Sustain
    }
}

/// Strategy for the configured mode
pub fn strategy_for(mode: DeviceMode) -> Box<dyn ModeStrategy> {
    match mode {
        DeviceMode::Door | DeviceMode::KeyLocker => Box::new(PulseStrategy::new(mode)),
        DeviceMode::Interlock => Box::new(InterlockStrategy),
    }
}
