//! Keyward Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by every layer of the node:
//! - Identifiers (TagId, SessionId)
//! - Time primitives (Timestamp, Clock)
//! - Device mode and contact polarity
//! - Trigger state and the timer-to-loop signal cell
//! - Status signals, errors and configuration

pub mod config;
pub mod error;
pub mod id;
pub mod mode;
pub mod status;
pub mod time;
pub mod trigger;

pub use config::*;
pub use error::*;
pub use id::*;
pub use mode::*;
pub use status::*;
pub use time::*;
pub use trigger::*;
