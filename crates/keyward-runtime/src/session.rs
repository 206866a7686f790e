//! Session lifecycle
//!
//! The manager owns the contact driver and the heartbeat timer so that a
//! session exists exactly while the contact is held engaged, and the
//! heartbeat timer runs exactly while a session exists.

use std::time::Duration;

use keyward_core::{Clock, SessionId, TagId, Timestamp};

use crate::{ContactDriver, Ticker};

/// Live authorization of an engaged interlock
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub holder: TagId,
    pub engaged_since: Timestamp,
}

/// Who ended a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The holder swiped again
    Holder,
    /// A different tag was swiped
    Bystander,
    /// Ended from the admin surface
    Forced,
}

/// Contact, session and heartbeat timer
pub struct SessionManager {
    contact: ContactDriver,
    heartbeat: Box<dyn Ticker>,
    heartbeat_period: Duration,
    active: Option<Session>,
}

impl SessionManager {
    pub fn new(contact: ContactDriver, heartbeat: Box<dyn Ticker>, heartbeat_period: Duration) -> Self {
        SessionManager {
            contact,
            heartbeat,
            heartbeat_period,
            active: None,
        }
    }

    /// Engage the contact and open a session held by `holder`
    pub fn begin(&mut self, id: SessionId, holder: TagId, now: Timestamp) -> &Session {
        if let Some(stale) = self.active.take() {
            tracing::warn!(session = %stale.id, "replacing unterminated session");
        }
        self.contact.engage();
        self.heartbeat.attach(self.heartbeat_period);
        tracing::info!(session = %id, %holder, "session started");
        self.active.insert(Session {
            id,
            holder,
            engaged_since: now,
        })
    }

    /// Disengage the contact, stop the heartbeat and destroy the session
    pub fn end(&mut self, reason: SessionEnd, now: Timestamp) -> Option<Session> {
        self.contact.disengage();
        self.heartbeat.detach();
        let session = self.active.take()?;
        tracing::info!(
            session = %session.id,
            holder = %session.holder,
            ?reason,
            held_ms = (now - session.engaged_since).as_millis() as u64,
            "session ended"
        );
        Some(session)
    }

    /// Engage, hold for `dwell`, disengage. Only valid with no session.
    pub fn pulse(&mut self, clock: &dyn Clock, dwell: Duration) -> bool {
        if self.active.is_some() {
            tracing::warn!("pulse refused while a session holds the contact");
            return false;
        }
        self.contact.engage();
        clock.delay(dwell);
        self.contact.disengage();
        true
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    #[inline]
    pub fn has_session(&self) -> bool {
        self.active.is_some()
    }

    #[inline]
    pub fn is_engaged(&self) -> bool {
        self.contact.is_engaged()
    }

    pub fn heartbeat_attached(&self) -> bool {
        self.heartbeat.is_attached()
    }
}
