//! Identity types for the access-control node
//!
//! Tag identifiers are the 32-bit payload of a reader frame. Session
//! identifiers are opaque strings issued by the remote authority.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// RFID tag identity - big-endian payload of a reader frame
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u32);

impl TagId {
    /// Reserved "no tag" value
    pub const NONE: TagId = TagId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        TagId(id)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        TagId(u32::from_be_bytes(bytes))
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

/// Decimal, as the authority expects it in request paths
impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TagId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(TagId)
    }
}

/// Session identity - opaque token issued by the authority on grant
///
/// An empty token marks a session opened from the offline cache; such a
/// session is never reported to the authority.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// Session opened without the authority
    pub fn local() -> Self {
        SessionId(String::new())
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "Session(<local>)")
        } else {
            write!(f, "Session({})", self.0)
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            f.write_str("<local>")
        } else {
            f.write_str(&self.0)
        }
    }
}
