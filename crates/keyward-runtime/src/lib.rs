//! Keyward Runtime - Node orchestration and control loop
//!
//! Each loop iteration:
//! 1. Apply at most one admin command
//! 2. Drain timer triggers posted since the last tick
//! 3. Service exactly one pending trigger (check-in, cache refresh,
//!    session heartbeat or offline fallback)
//! 4. Service the RFID reader, subject to the read squelch

pub mod admin;
pub mod hal;
pub mod node;
pub mod session;
pub mod squelch;
pub mod strategy;
pub mod ticker;

pub use admin::*;
pub use hal::*;
pub use node::*;
pub use session::*;
pub use squelch::*;
pub use strategy::*;
pub use ticker::*;
