//! Remote authority client
//!
//! Four idempotent request types. None is retried here: a failed check-in
//! or heartbeat is simply attempted again when its timer next fires.

use std::sync::Arc;
use std::time::Duration;

use keyward_core::{
    Clock, DeviceMode, KeywardError, KeywardResult, NodeConfig, SessionId, TagId,
};
use keyward_wire::{
    parse_body, AccessResponse, AuthorisedTags, CheckinResponse, Endpoint, SECRET_PARAM,
};
use reqwest::Url;

use crate::HttpTransport;

/// Result of a successful check-in exchange
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckinOutcome {
    /// Server hash matches ours
    InSync,
    /// Server holds a different tag list
    HashChanged(String),
    /// Server answered but reported `success: false`
    Rejected,
}

/// Authority verdict for one tag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessDecision {
    pub granted: bool,
    pub session_id: Option<SessionId>,
}

impl AccessDecision {
    pub fn denied() -> Self {
        AccessDecision {
            granted: false,
            session_id: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClientStats {
    pub requests: u64,
    pub transport_failures: u64,
    pub server_failures: u64,
    pub parse_failures: u64,
}

/// Client for the remote authority API
pub struct AuthorityClient {
    transport: Box<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    base_url: String,
    mode: DeviceMode,
    secret: String,
    pacing: Duration,
    stats: ClientStats,
}

impl AuthorityClient {
    pub fn new(config: &NodeConfig, transport: Box<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        AuthorityClient {
            transport,
            clock,
            base_url: config.base_url().to_string(),
            mode: config.mode,
            secret: config.secret.clone(),
            pacing: config.pacing,
            stats: ClientStats::default(),
        }
    }

    /// Report in and compare the server's tag-list hash with ours
    pub fn checkin(&mut self, current_hash: &str) -> KeywardResult<CheckinOutcome> {
        let body = self.get(Endpoint::Checkin)?;
        let response: CheckinResponse = self.parse(&body)?;

        if !response.success {
            tracing::warn!("authority rejected check-in");
            return Ok(CheckinOutcome::Rejected);
        }
        let server_hash = response.hash_of_tags.unwrap_or_default();
        if server_hash != current_hash {
            tracing::info!(server = %server_hash, local = %current_hash, "cache hashes differ");
            Ok(CheckinOutcome::HashChanged(server_hash))
        } else {
            Ok(CheckinOutcome::InSync)
        }
    }

    /// Full authorized-tag list and its hash
    pub fn fetch_authorized_tags(&mut self) -> KeywardResult<AuthorisedTags> {
        let body = self.get(Endpoint::Authorised)?;
        let doc: AuthorisedTags = self.parse(&body)?;
        tracing::info!(
            tags = doc.authorised_tags.len(),
            hash = %doc.authorised_tags_hash,
            "fetched authorized tag list"
        );
        Ok(doc)
    }

    /// Ask the authority whether `tag` may use this device now
    pub fn authorize(&mut self, tag: TagId) -> KeywardResult<AccessDecision> {
        let body = self.get(Endpoint::Check(tag))?;
        let response: AccessResponse = self.parse(&body)?;
        let session_id = response
            .session_id
            .filter(|id| !id.is_empty())
            .map(SessionId::new);
        Ok(AccessDecision {
            granted: response.access,
            session_id,
        })
    }

    /// Keep a session alive, or report that `ending_tag` ended it
    pub fn session_heartbeat(
        &mut self,
        session: &SessionId,
        ending_tag: Option<TagId>,
    ) -> KeywardResult<()> {
        let endpoint = match ending_tag {
            Some(tag) => Endpoint::SessionEnd(session, tag),
            None => Endpoint::SessionHeartbeat(session),
        };
        let body = self.get(endpoint)?;
        tracing::debug!(%session, response = %body.trim(), "session heartbeat acknowledged");
        Ok(())
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Request URL with every path segment and the secret percent-encoded
    fn url(&self, endpoint: &Endpoint<'_>, secret: &str) -> KeywardResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| KeywardError::InvalidConfig(format!("host {:?}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| {
                KeywardError::InvalidConfig(format!("host {:?} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(endpoint.segments(self.mode))
            .push("");
        url.query_pairs_mut().append_pair(SECRET_PARAM, secret);
        Ok(url)
    }

    fn get(&mut self, endpoint: Endpoint<'_>) -> KeywardResult<String> {
        let url = self.url(&endpoint, &self.secret)?;
        let shown = self.url(&endpoint, "***")?;
        tracing::info!(endpoint = endpoint.name(), url = %shown, "authority request");

        // Let the network stack drain before and after the call.
        self.clock.delay(self.pacing);
        let result = self.transport.get(url.as_str());
        self.clock.delay(self.pacing);
        self.stats.requests += 1;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.stats.transport_failures += 1;
                let e = match e {
                    KeywardError::TransportFailure(msg) => KeywardError::TransportFailure(
                        self.redact(&msg.replace(url.as_str(), shown.as_str())),
                    ),
                    other => other,
                };
                tracing::warn!(endpoint = endpoint.name(), error = %e, "authority unreachable");
                return Err(e);
            }
        };

        if !response.is_success() {
            self.stats.server_failures += 1;
            tracing::warn!(
                endpoint = endpoint.name(),
                status = response.status,
                "authority returned failure status"
            );
            return Err(KeywardError::ServerFailure {
                status: response.status,
            });
        }
        tracing::debug!(endpoint = endpoint.name(), body = %response.body.trim(), "authority response");
        Ok(response.body)
    }

    fn parse<T: serde::de::DeserializeOwned>(&mut self, body: &str) -> KeywardResult<T> {
        parse_body(body).map_err(|e| {
            self.stats.parse_failures += 1;
            tracing::warn!(error = %e, "malformed authority response");
            e
        })
    }

    /// Mask the device secret wherever it appears
    fn redact(&self, text: &str) -> String {
        if self.secret.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.secret, "***")
        }
    }
}
