//! Peripheral seams
//!
//! The control loop drives the contact relay, the status light and the
//! period timers only through these traits.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use keyward_core::{ContactPolarity, StatusSignal};
use keyward_wire::ByteSource;
use parking_lot::Mutex;

/// Raw relay output
pub trait ContactOutput: Send {
    /// Drive the output pin high (`true`) or low
    fn write(&mut self, level: bool);
}

/// Status-light collaborator
pub trait StatusLight: Send {
    fn show(&mut self, signal: StatusSignal);
}

/// Periodic timer bound to one trigger
///
/// Attaching an attached ticker restarts it with the new period.
pub trait Ticker: Send {
    fn attach(&mut self, period: Duration);
    fn detach(&mut self);
    fn is_attached(&self) -> bool;
}

/// Relay driver that knows the engaged state and the wiring polarity
pub struct ContactDriver {
    output: Box<dyn ContactOutput>,
    polarity: ContactPolarity,
    engaged: bool,
}

impl ContactDriver {
    /// Wrap an output and drive it to the disengaged level
    pub fn new(mut output: Box<dyn ContactOutput>, polarity: ContactPolarity) -> Self {
        output.write(polarity.level(false));
        ContactDriver {
            output,
            polarity,
            engaged: false,
        }
    }

    pub fn engage(&mut self) {
        self.set(true);
    }

    pub fn disengage(&mut self) {
        self.set(false);
    }

    #[inline]
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn polarity(&self) -> ContactPolarity {
        self.polarity
    }

    fn set(&mut self, engaged: bool) {
        self.engaged = engaged;
        self.output.write(self.polarity.level(engaged));
        tracing::debug!(engaged, "contact driven");
    }
}

/// Contact output that only logs, for hosts without a relay
#[derive(Debug, Default)]
pub struct LoggedContact {
    pub level: bool,
}

impl ContactOutput for LoggedContact {
    fn write(&mut self, level: bool) {
        if level != self.level {
            tracing::info!(level, "contact output");
        }
        self.level = level;
    }
}

/// Status light that only logs
#[derive(Debug, Default)]
pub struct LoggedStatus;

impl StatusLight for LoggedStatus {
    fn show(&mut self, signal: StatusSignal) {
        tracing::info!(status = %signal, "status light");
    }
}

/// Reader buffer shared between a reader thread and the control loop
#[derive(Clone, Default)]
pub struct SharedReader {
    buf: Arc<Mutex<VecDeque<u8>>>,
}

impl SharedReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the device
    pub fn push(&self, bytes: &[u8]) {
        self.buf.lock().extend(bytes.iter().copied());
    }
}

impl ByteSource for SharedReader {
    fn available(&self) -> usize {
        self.buf.lock().len()
    }

    fn read(&mut self, out: &mut [u8]) -> usize {
        self.buf.lock().read(out)
    }

    fn flush(&mut self) -> usize {
        let mut buf = self.buf.lock();
        let n = buf.len();
        buf.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Pin(Arc<Mutex<Vec<bool>>>);

    impl ContactOutput for Pin {
        fn write(&mut self, level: bool) {
            self.0.lock().push(level);
        }
    }

    #[test]
    fn test_active_high_contact() {
        let pin = Pin::default();
        let mut contact = ContactDriver::new(Box::new(pin.clone()), ContactPolarity::ActiveHigh);
        contact.engage();
        assert!(contact.is_engaged());
        contact.disengage();
        assert_eq!(*pin.0.lock(), vec![false, true, false]);
    }

    #[test]
    fn test_active_low_contact() {
        let pin = Pin::default();
        let mut contact = ContactDriver::new(Box::new(pin.clone()), ContactPolarity::ActiveLow);
        assert!(!contact.is_engaged());
        contact.engage();
        assert_eq!(*pin.0.lock(), vec![true, false]);
    }

    #[test]
    fn test_shared_reader_sees_pushed_bytes() {
        let writer = SharedReader::new();
        let mut reader = writer.clone();
        writer.push(&[1, 2, 3]);

        let mut out = [0u8; 2];
        assert_eq!(reader.read(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(reader.available(), 1);
        assert_eq!(reader.flush(), 1);
        assert_eq!(writer.available(), 0);
    }
}
