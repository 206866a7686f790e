//! Scripted remote authority
//!
//! Serves the authority HTTP API from in-memory state and records every
//! request path. Outages can be switched on directly or injected at random
//! from a seeded RNG, so a failing run replays exactly.

use std::collections::HashMap;
use std::sync::Arc;

use keyward_core::{KeywardError, KeywardResult, TagId};
use keyward_transport::{HttpResponse, HttpTransport};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

struct AuthorityState {
    tags: Vec<TagId>,
    hash: String,
    /// Granted tags and the session id issued for each
    grants: HashMap<TagId, Option<String>>,
    down: bool,
    status_override: Option<u16>,
    faults: Option<(StdRng, f64)>,
    requests: Vec<String>,
}

/// In-memory authority. Clones share state.
#[derive(Clone)]
pub struct SimAuthority {
    state: Arc<Mutex<AuthorityState>>,
}

impl Default for SimAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl SimAuthority {
    pub fn new() -> Self {
        SimAuthority {
            state: Arc::new(Mutex::new(AuthorityState {
                tags: Vec::new(),
                hash: String::new(),
                grants: HashMap::new(),
                down: false,
                status_override: None,
                faults: None,
                requests: Vec::new(),
            })),
        }
    }

    /// Publish an authorized tag list under `hash`
    pub fn set_tag_list(&self, tags: &[u32], hash: &str) {
        let mut state = self.state.lock();
        state.tags = tags.iter().copied().map(TagId).collect();
        state.hash = hash.to_string();
    }

    /// Grant `tag`, issuing `session` on each check
    pub fn grant(&self, tag: u32, session: Option<&str>) {
        self.state
            .lock()
            .grants
            .insert(TagId(tag), session.map(str::to_string));
    }

    pub fn revoke(&self, tag: u32) {
        self.state.lock().grants.remove(&TagId(tag));
    }

    /// Refuse every connection
    pub fn set_down(&self, down: bool) {
        self.state.lock().down = down;
    }

    /// Answer every request with this status
    pub fn set_status(&self, status: Option<u16>) {
        self.state.lock().status_override = status;
    }

    /// Fail each request with probability `rate`
    pub fn with_faults(self, seed: u64, rate: f64) -> Self {
        self.state.lock().faults = Some((StdRng::seed_from_u64(seed), rate.clamp(0.0, 1.0)));
        self
    }

    /// Request paths seen so far, query string stripped
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    /// Requests whose path contains `fragment`
    pub fn count(&self, fragment: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|path| path.contains(fragment))
            .count()
    }

    pub fn last_request(&self) -> Option<String> {
        self.state.lock().requests.last().cloned()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }
}

impl HttpTransport for SimAuthority {
    fn get(&self, url: &str) -> KeywardResult<HttpResponse> {
        let mut state = self.state.lock();

        let path = url
            .find("/api/")
            .map(|start| &url[start..])
            .unwrap_or(url);
        let path = path.split('?').next().unwrap_or(path).to_string();
        state.requests.push(path.clone());

        if state.down {
            return Err(KeywardError::TransportFailure(format!(
                "error sending request for url ({url}): connection refused"
            )));
        }
        if let Some((rng, rate)) = state.faults.as_mut() {
            if rng.gen_bool(*rate) {
                return Err(KeywardError::TransportFailure("operation timed out".into()));
            }
        }
        if let Some(status) = state.status_override {
            return Ok(HttpResponse::new(status, "Internal Server Error"));
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let body = match segments.as_slice() {
            ["api", _, "checkin"] => json!({ "success": true, "hashOfTags": state.hash }),
            ["api", _, "authorised"] => json!({
                "authorised_tags": state.tags,
                "authorised_tags_hash": state.hash,
            }),
            ["api", _, "check", tag] => {
                let tag = tag.parse::<u32>().map(TagId).unwrap_or(TagId::NONE);
                match state.grants.get(&tag) {
                    Some(Some(session)) => json!({ "access": true, "session_id": session }),
                    Some(None) => json!({ "access": true }),
                    None => json!({ "access": false }),
                }
            }
            ["api", _, "session", _, "heartbeat"] | ["api", _, "session", _, "end", _] => {
                json!({ "success": true })
            }
            _ => return Ok(HttpResponse::new(404, "Not Found")),
        };
        Ok(HttpResponse::ok(body.to_string()))
    }
}
