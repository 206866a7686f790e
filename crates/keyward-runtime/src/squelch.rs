//! Read squelch
//!
//! One badge presentation produces a burst of identical frames. Once a
//! swipe has been handled, reads stay closed until the window has fully
//! elapsed.

use std::time::Duration;

use keyward_core::Timestamp;

#[derive(Clone, Debug)]
pub struct Squelch {
    window: Duration,
    last_read: Option<Timestamp>,
}

impl Squelch {
    pub fn new(window: Duration) -> Self {
        Squelch {
            window,
            last_read: None,
        }
    }

    /// True once `now` is strictly past the end of the window
    pub fn is_open(&self, now: Timestamp) -> bool {
        match self.last_read {
            Some(last) => now > last + self.window,
            None => true,
        }
    }

    /// Record the end of a handled swipe
    pub fn latch(&mut self, at: Timestamp) {
        self.last_read = Some(at);
    }

    pub fn last_read(&self) -> Option<Timestamp> {
        self.last_read
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
