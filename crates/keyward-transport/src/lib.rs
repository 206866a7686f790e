//! Keyward Transport - Remote authority client
//!
//! This crate provides:
//! - The `HttpTransport` seam and its blocking reqwest implementation
//! - The authority client: check-in, tag list, tag check, session heartbeat

pub mod client;
pub mod http;

pub use client::*;
pub use http::*;
