//! Keyward Cache - Last-known authorized tag set
//!
//! This crate provides:
//! - A bounded tag set and immutable snapshots of it
//! - The `CacheStore` persistence seam (file and in-memory stores)
//! - The authorization cache with hash-gated refresh and offline fallback

pub mod cache;
pub mod snapshot;
pub mod store;

pub use cache::*;
pub use snapshot::*;
pub use store::*;
