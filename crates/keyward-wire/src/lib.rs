//! Keyward Wire - Byte and payload formats
//!
//! This crate implements the formats the node reads and writes:
//! - RFID reader frames (4 payload bytes + XOR checksum)
//! - Remote authority JSON payloads
//! - Remote authority endpoint paths

pub mod api;
pub mod endpoint;
pub mod rfid;

pub use api::*;
pub use endpoint::*;
pub use rfid::*;
