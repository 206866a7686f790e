//! Administrative commands
//!
//! Operator commands are external triggers into the same entry points the
//! timers and the reader use. They arrive as text lines:
//!
//! ```text
//! checkin | refresh | offline | clear | load | authas <tag> | end | bump
//! status | tags | cache
//! ```

use std::fmt;
use std::str::FromStr;

use keyward_cache::CacheSnapshot;
use keyward_core::{DeviceMode, KeywardError, SessionId, TagId, TriggerState};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    /// Run a check-in on the next tick
    Checkin,
    /// Fetch the authorized tag list on the next tick
    Refresh,
    /// Enter offline fallback on the next tick
    Offline,
    /// Empty the in-memory tag set and leave offline fallback
    Clear,
    /// Reload the persisted tag set into memory, offline mode unchanged
    Load,
    /// Handle a swipe of the given tag without the reader
    AuthAs(TagId),
    /// Release the contact and drop the session locally
    End,
    /// Pulse the contact without authorization
    Bump,
    Status,
    Tags,
    /// Show the persisted snapshot
    Cache,
}

impl FromStr for AdminCommand {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| KeywardError::UnknownCommand(String::new()))?;

        let command = match verb.to_ascii_lowercase().as_str() {
            "checkin" => AdminCommand::Checkin,
            "refresh" => AdminCommand::Refresh,
            "offline" => AdminCommand::Offline,
            "clear" => AdminCommand::Clear,
            "load" => AdminCommand::Load,
            "authas" => {
                let tag = words
                    .next()
                    .ok_or_else(|| KeywardError::UnknownCommand("authas needs a tag id".into()))?
                    .parse::<TagId>()
                    .map_err(|_| KeywardError::UnknownCommand(s.trim().to_string()))?;
                if tag.is_none() {
                    return Err(KeywardError::UnknownCommand("tag 0 is reserved".into()));
                }
                AdminCommand::AuthAs(tag)
            }
            "end" => AdminCommand::End,
            "bump" => AdminCommand::Bump,
            "status" => AdminCommand::Status,
            "tags" => AdminCommand::Tags,
            "cache" => AdminCommand::Cache,
            _ => return Err(KeywardError::UnknownCommand(s.trim().to_string())),
        };

        if words.next().is_some() {
            return Err(KeywardError::UnknownCommand(s.trim().to_string()));
        }
        Ok(command)
    }
}

/// Snapshot of node state for the operator
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub device_name: String,
    pub mode: DeviceMode,
    pub last_tag: Option<TagId>,
    pub session: Option<SessionId>,
    pub session_holder: Option<TagId>,
    pub engaged: bool,
    pub offline: bool,
    pub consecutive_failures: u32,
    pub cache_hash: String,
    pub cached_tags: usize,
    #[serde(skip)]
    pub trigger: TriggerState,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_name, self.mode)?;
        match &self.session {
            Some(id) => write!(f, " session={id}")?,
            None => write!(f, " no-session")?,
        }
        if let Some(tag) = self.last_tag {
            write!(f, " last-tag={tag}")?;
        }
        write!(
            f,
            " engaged={} offline={} failures={} cache={}[{}]",
            self.engaged, self.offline, self.consecutive_failures, self.cache_hash, self.cached_tags
        )
    }
}

/// Result of an admin command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminReply {
    Done,
    Status(NodeStatus),
    Tags(Vec<TagId>),
    /// Tags now held in memory
    Loaded(usize),
    /// Persisted snapshot, if any
    Persisted(Option<CacheSnapshot>),
    /// Not applicable in this mode or state
    Refused(String),
}
