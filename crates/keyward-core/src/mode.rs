//! Device mode and contact polarity

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::KeywardError;

/// What the node controls
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Door strike: pulse on grant
    Door,
    /// Power interlock: sustained contact tied to a session
    Interlock,
    /// Key locker: pulse on grant, same as a door
    #[serde(rename = "keylocker")]
    KeyLocker,
}

impl DeviceMode {
    /// Path segment the authority uses for this device class
    pub fn api_segment(self) -> &'static str {
        match self {
            DeviceMode::Door => "door",
            DeviceMode::Interlock => "interlock",
            DeviceMode::KeyLocker => "keylocker",
        }
    }

    pub fn uses_session(self) -> bool {
        matches!(self, DeviceMode::Interlock)
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_segment())
    }
}

impl FromStr for DeviceMode {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "door" => Ok(DeviceMode::Door),
            "interlock" => Ok(DeviceMode::Interlock),
            "keylocker" | "key-locker" => Ok(DeviceMode::KeyLocker),
            other => Err(KeywardError::InvalidConfig(format!(
                "unknown device mode: {other}"
            ))),
        }
    }
}

/// Relay level that engages the contact
///
/// Fail-open doors are wired so that the relay is normally driven and a
/// grant drops it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactPolarity {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl ContactPolarity {
    /// Output level for the requested contact state
    #[inline]
    pub fn level(self, engaged: bool) -> bool {
        match self {
            ContactPolarity::ActiveHigh => engaged,
            ContactPolarity::ActiveLow => !engaged,
        }
    }
}
