//! Remote authority endpoints

use keyward_core::{DeviceMode, SessionId, TagId};

/// Query parameter carrying the device secret
pub const SECRET_PARAM: &str = "secret";

/// One authority request target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Checkin,
    Authorised,
    Check(TagId),
    SessionHeartbeat(&'a SessionId),
    SessionEnd(&'a SessionId, TagId),
}

impl Endpoint<'_> {
    /// Path segments under the host. Values are raw; the caller encodes.
    pub fn segments(&self, mode: DeviceMode) -> Vec<String> {
        let mut segments = vec!["api".to_string(), mode.api_segment().to_string()];
        match self {
            Endpoint::Checkin => segments.push("checkin".into()),
            Endpoint::Authorised => segments.push("authorised".into()),
            Endpoint::Check(tag) => segments.extend(["check".into(), tag.to_string()]),
            Endpoint::SessionHeartbeat(session) => segments.extend([
                "session".into(),
                session.as_str().to_string(),
                "heartbeat".into(),
            ]),
            Endpoint::SessionEnd(session, tag) => segments.extend([
                "session".into(),
                session.as_str().to_string(),
                "end".into(),
                tag.to_string(),
            ]),
        }
        segments
    }

    /// Unencoded path with trailing slash, for logs
    pub fn path(&self, mode: DeviceMode) -> String {
        format!("/{}/", self.segments(mode).join("/"))
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Checkin => "checkin",
            Endpoint::Authorised => "authorised",
            Endpoint::Check(_) => "check",
            Endpoint::SessionHeartbeat(_) => "session-heartbeat",
            Endpoint::SessionEnd(..) => "session-end",
        }
    }
}
