//! Status signal consumed by the status-light collaborator

use std::fmt;

/// Node posture shown to the person at the reader
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StatusSignal {
    /// Waiting for a tag, contact disengaged
    #[default]
    Idle,
    /// A tag is being checked
    Reading,
    /// Authority refused the last tag
    Denied,
    /// Last request to the authority failed
    NetworkError,
    /// Contact engaged under an active session
    SessionActive,
}

impl StatusSignal {
    pub fn name(self) -> &'static str {
        match self {
            StatusSignal::Idle => "idle",
            StatusSignal::Reading => "reading",
            StatusSignal::Denied => "denied",
            StatusSignal::NetworkError => "network-error",
            StatusSignal::SessionActive => "session-active",
        }
    }
}

impl fmt::Display for StatusSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
