//! Keyward Test Harness - deterministic node simulation
//!
//! This crate provides:
//! - A simulated clock where pacing and dwell delays advance time
//! - A scripted remote authority with seeded fault injection
//! - Recording contact, status light and timer peripherals
//! - A node harness that drives full control-loop scenarios

pub mod authority;
pub mod harness;
pub mod peripherals;

#[cfg(test)]
mod scenarios;

pub use authority::*;
pub use harness::*;
pub use peripherals::*;
