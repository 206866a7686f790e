//! Keyward Node - control loop implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keyward_cache::{AuthorizationCache, CacheSnapshot, CacheStore, RefreshOutcome};
use keyward_core::{
    Clock, KeywardError, KeywardResult, NodeConfig, SessionId, StatusSignal, TagId, Trigger,
    TriggerCell, TriggerSet, TriggerState,
};
use keyward_transport::{AccessDecision, AuthorityClient, CheckinOutcome, HttpTransport};
use keyward_wire::{ByteSource, DecodeOutcome, FrameDecoder};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{
    strategy_for, AdminCommand, AdminReply, ContactDriver, ContactOutput, GrantAction,
    ModeStrategy, NodeStatus, SessionEnd, SessionManager, Squelch, StatusLight, TagAction, Ticker,
};

/// Peripherals and I/O seams a node is built from
pub struct NodeParts {
    pub transport: Box<dyn HttpTransport>,
    pub store: Box<dyn CacheStore>,
    pub contact: Box<dyn ContactOutput>,
    pub status: Box<dyn StatusLight>,
    /// Bound to `Trigger::Checkin`
    pub checkin_timer: Box<dyn Ticker>,
    /// Bound to `Trigger::SessionHeartbeat`
    pub heartbeat_timer: Box<dyn Ticker>,
}

#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub ticks: u64,
    pub triggers_serviced: u64,
    pub checkins: u64,
    pub checkin_failures: u64,
    pub cache_refreshes: u64,
    pub heartbeats: u64,
    pub tags_read: u64,
    pub grants: u64,
    pub denials: u64,
    pub sessions_ended: u64,
    pub admin_commands: u64,
}

/// Keyward Node - one access-control device
pub struct Node {
    config: NodeConfig,
    clock: Arc<dyn Clock>,
    client: AuthorityClient,
    cache: AuthorizationCache,
    sessions: SessionManager,
    strategy: Box<dyn ModeStrategy>,
    status_light: Box<dyn StatusLight>,
    /// Last signal sent to the light
    shown: Option<StatusSignal>,
    /// Timer side of the trigger channel
    triggers: TriggerCell,
    /// Loop-owned pending work
    pending: TriggerSet,
    /// Trigger being serviced; Idle between iterations
    state: TriggerState,
    checkin_timer: Box<dyn Ticker>,
    decoder: FrameDecoder,
    squelch: Squelch,
    /// Tag behind the last grant
    last_tag: Option<TagId>,
    consecutive_failures: u32,
    stats: RuntimeStats,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        clock: Arc<dyn Clock>,
        triggers: TriggerCell,
        parts: NodeParts,
    ) -> Self {
        let client = AuthorityClient::new(&config, parts.transport, Arc::clone(&clock));
        let cache = AuthorizationCache::new(parts.store, config.max_cached_tags);
        let contact = ContactDriver::new(parts.contact, config.contact_polarity);
        let sessions = SessionManager::new(
            contact,
            parts.heartbeat_timer,
            config.session_heartbeat_interval,
        );
        let strategy = strategy_for(config.mode);
        let squelch = Squelch::new(config.squelch);
        let decoder = FrameDecoder::with_read_timeout(config.read_timeout);

        Node {
            config,
            clock,
            client,
            cache,
            sessions,
            strategy,
            status_light: parts.status,
            shown: None,
            triggers,
            pending: TriggerSet::EMPTY,
            state: TriggerState::Idle,
            checkin_timer: parts.checkin_timer,
            decoder,
            squelch,
            last_tag: None,
            consecutive_failures: 0,
            stats: RuntimeStats::default(),
        }
    }

    /// Boot: load the persisted cache and start the check-in timer
    pub fn start(&mut self) {
        tracing::info!(
            device = %self.config.device_name,
            mode = %self.config.mode,
            host = %self.config.base_url(),
            "starting node"
        );
        if let Err(e) = self.cache.load() {
            tracing::warn!(error = %e, "persisted cache unusable, denying until refreshed");
        }
        self.checkin_timer.attach(self.config.checkin_interval);
        self.show_baseline();
    }

    /// Run one loop iteration. Returns the trigger state serviced.
    pub fn tick(&mut self, reader: &mut dyn ByteSource) -> TriggerState {
        self.stats.ticks += 1;

        let posted = self.triggers.drain();
        self.pending.merge(posted);

        let serviced = match self.pending.take_next() {
            Some(trigger) => {
                self.state = trigger.into();
                self.service(trigger);
                self.stats.triggers_serviced += 1;
                self.state
            }
            None => TriggerState::Idle,
        };
        self.state = TriggerState::Idle;

        self.service_reader(reader);
        serviced
    }

    /// Loop until `shutdown` is raised, applying admin commands between ticks
    pub fn run(
        &mut self,
        reader: &mut dyn ByteSource,
        admin: &mut mpsc::Receiver<AdminCommand>,
        shutdown: &AtomicBool,
    ) {
        self.start();
        while !shutdown.load(Ordering::Acquire) {
            match admin.try_recv() {
                Ok(command) => {
                    let reply = self.handle_admin(command);
                    log_reply(command, &reply);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
            self.tick(reader);
            self.clock.delay(self.config.pacing);
        }
        if self.sessions.has_session() {
            self.end_session(SessionEnd::Forced, None);
        }
        self.checkin_timer.detach();
        tracing::info!(ticks = self.stats.ticks, "node stopped");
    }

    fn service(&mut self, trigger: Trigger) {
        tracing::debug!(state = %self.state, "servicing trigger");
        match trigger {
            Trigger::Checkin => self.checkin(),
            Trigger::SessionHeartbeat => self.session_heartbeat(),
            Trigger::CacheRefresh => self.refresh_cache(),
            Trigger::OfflineFallback => self.enter_offline(),
        }
    }

    fn checkin(&mut self) {
        self.stats.checkins += 1;
        let hash = self.cache.current_hash().to_string();

        match self.client.checkin(&hash) {
            Ok(CheckinOutcome::Rejected) => self.record_checkin_failure(),
            Ok(outcome) => {
                self.consecutive_failures = 0;
                if self.cache.is_offline() {
                    self.cache.clear();
                }
                if let CheckinOutcome::HashChanged(_) = outcome {
                    self.pending.insert(Trigger::CacheRefresh);
                }
                self.show_baseline();
            }
            Err(e) if e.is_network() => self.record_checkin_failure(),
            // Malformed body: this request is lost, nothing else changes.
            Err(e) => tracing::warn!(error = %e, "check-in response unusable"),
        }
    }

    fn record_checkin_failure(&mut self) {
        self.stats.checkin_failures += 1;
        self.consecutive_failures += 1;
        self.show(StatusSignal::NetworkError);

        if self.consecutive_failures >= self.config.offline_after_failures
            && !self.cache.is_offline()
        {
            tracing::warn!(
                failures = self.consecutive_failures,
                "authority unreachable, scheduling offline fallback"
            );
            self.pending.insert(Trigger::OfflineFallback);
        }
    }

    fn refresh_cache(&mut self) {
        self.stats.cache_refreshes += 1;
        let doc = match self.client.fetch_authorized_tags() {
            Ok(doc) => doc,
            Err(e) => {
                if e.is_network() {
                    self.show(StatusSignal::NetworkError);
                }
                return;
            }
        };

        let snapshot = CacheSnapshot::from_document(doc, self.config.max_cached_tags);
        match self.cache.refresh(snapshot) {
            Ok(RefreshOutcome::Unchanged) => {
                tracing::debug!("authorized tag list unchanged");
            }
            Ok(RefreshOutcome::Replaced { .. }) => {}
            Err(e) => tracing::warn!(error = %e, "failed to persist authorized tag list"),
        }
    }

    fn session_heartbeat(&mut self) {
        let Some(session) = self.sessions.active() else {
            tracing::debug!("heartbeat due without a session");
            return;
        };
        if session.id.is_local() {
            return;
        }
        let id = session.id.clone();
        self.stats.heartbeats += 1;
        if let Err(e) = self.client.session_heartbeat(&id, None) {
            self.report_request_error(&e);
        }
    }

    fn enter_offline(&mut self) {
        match self.cache.enter_offline() {
            Ok(tags) => tracing::info!(tags, "offline fallback active"),
            Err(e) => tracing::warn!(error = %e, "offline fallback without a usable cache"),
        }
    }

    fn service_reader(&mut self, reader: &mut dyn ByteSource) {
        let now = self.clock.now();
        if !self.squelch.is_open(now) {
            let flushed = self.decoder.discard(reader);
            if flushed > 0 {
                tracing::debug!(flushed, "reader squelched");
            }
            return;
        }
        self.show_baseline();

        if let DecodeOutcome::Tag { read, .. } = self.decoder.poll(reader, now) {
            self.handle_tag(read.tag);
            // Measured from the end of the swipe; a pulse can outlast the window.
            self.squelch.latch(self.clock.now());
        }
    }

    /// Apply a validated swipe
    pub fn handle_tag(&mut self, tag: TagId) {
        self.stats.tags_read += 1;
        tracing::info!(%tag, "tag presented");

        match self.strategy.on_tag(tag, self.sessions.active()) {
            TagAction::EndSession(reason) => {
                self.show(StatusSignal::Reading);
                self.end_session(reason, Some(tag));
            }
            TagAction::Authorize => {
                self.show(StatusSignal::Reading);
                match self.authorize(tag) {
                    Ok(decision) if decision.granted => self.apply_grant(tag, decision),
                    Ok(_) => {
                        self.stats.denials += 1;
                        tracing::info!(%tag, "access denied");
                        self.show(StatusSignal::Denied);
                        self.clock.delay(self.config.denied_hold);
                    }
                    Err(e) => self.report_request_error(&e),
                }
            }
        }
    }

    fn authorize(&mut self, tag: TagId) -> KeywardResult<AccessDecision> {
        if self.cache.is_offline() {
            let granted = self.cache.is_authorized(tag);
            tracing::info!(%tag, granted, "authorized from local cache");
            return Ok(AccessDecision {
                granted,
                session_id: None,
            });
        }
        self.client.authorize(tag)
    }

    fn apply_grant(&mut self, tag: TagId, decision: AccessDecision) {
        tracing::info!(%tag, "access granted");
        match self.strategy.on_grant() {
            GrantAction::Pulse => {
                self.stats.grants += 1;
                self.last_tag = Some(tag);
                self.sessions.pulse(self.clock.as_ref(), self.config.pulse_dwell);
                self.show_baseline();
            }
            GrantAction::Sustain => {
                let id = match decision.session_id {
                    Some(id) => id,
                    None if self.cache.is_offline() => SessionId::local(),
                    None => {
                        let e = KeywardError::ParseFailure("grant without session_id".into());
                        self.report_request_error(&e);
                        return;
                    }
                };
                self.stats.grants += 1;
                self.last_tag = Some(tag);
                let now = self.clock.now();
                self.sessions.begin(id, tag, now);
                self.show(StatusSignal::SessionActive);
            }
        }
    }

    /// Release the contact and tell the authority who ended the session
    fn end_session(&mut self, reason: SessionEnd, ending_tag: Option<TagId>) {
        let now = self.clock.now();
        let Some(session) = self.sessions.end(reason, now) else {
            return;
        };
        self.stats.sessions_ended += 1;
        self.last_tag = None;

        if let Some(tag) = ending_tag {
            if !session.id.is_local() {
                if let Err(e) = self.client.session_heartbeat(&session.id, Some(tag)) {
                    self.report_request_error(&e);
                }
            }
        }
        self.show_baseline();
    }

    fn report_request_error(&mut self, error: &KeywardError) {
        tracing::warn!(error = %error, "authority request failed");
        if error.is_network() {
            self.show(StatusSignal::NetworkError);
        }
    }

    /// Apply an operator command
    pub fn handle_admin(&mut self, command: AdminCommand) -> AdminReply {
        self.stats.admin_commands += 1;
        tracing::info!(?command, "admin command");

        match command {
            AdminCommand::Checkin => self.pending.insert(Trigger::Checkin),
            AdminCommand::Refresh => self.pending.insert(Trigger::CacheRefresh),
            AdminCommand::Offline => self.pending.insert(Trigger::OfflineFallback),
            AdminCommand::Clear => self.cache.clear(),
            AdminCommand::Load => {
                return match self.cache.load_into_memory() {
                    Ok(tags) => AdminReply::Loaded(tags),
                    Err(e) => AdminReply::Refused(e.to_string()),
                }
            }
            AdminCommand::AuthAs(tag) => self.handle_tag(tag),
            AdminCommand::End => {
                if !self.sessions.has_session() {
                    return AdminReply::Refused("no active session".into());
                }
                self.end_session(SessionEnd::Forced, None);
            }
            AdminCommand::Bump => {
                if self.strategy.on_grant() != GrantAction::Pulse {
                    let reason = format!("bump not supported in {} mode", self.config.mode);
                    return AdminReply::Refused(reason);
                }
                if !self.sessions.pulse(self.clock.as_ref(), self.config.pulse_dwell) {
                    return AdminReply::Refused("contact held".into());
                }
            }
            AdminCommand::Status => return AdminReply::Status(self.status()),
            AdminCommand::Tags => {
                return AdminReply::Tags(self.cache.tags().iter().collect())
            }
            AdminCommand::Cache => {
                return match self.cache.persisted() {
                    Ok(snapshot) => AdminReply::Persisted(snapshot),
                    Err(e) => AdminReply::Refused(e.to_string()),
                }
            }
        }
        AdminReply::Done
    }

    pub fn status(&self) -> NodeStatus {
        let session = self.sessions.active();
        NodeStatus {
            device_name: self.config.device_name.clone(),
            mode: self.config.mode,
            last_tag: self.last_tag,
            session: session.map(|s| s.id.clone()),
            session_holder: session.map(|s| s.holder),
            engaged: self.sessions.is_engaged(),
            offline: self.cache.is_offline(),
            consecutive_failures: self.consecutive_failures,
            cache_hash: self.cache.current_hash().to_string(),
            cached_tags: self.cache.len(),
            trigger: self.state,
        }
    }

    /// Resting signal: session, failing authority, or idle
    fn show_baseline(&mut self) {
        let signal = if self.sessions.is_engaged() {
            StatusSignal::SessionActive
        } else if self.consecutive_failures > 0 {
            StatusSignal::NetworkError
        } else {
            StatusSignal::Idle
        };
        self.show(signal);
    }

    fn show(&mut self, signal: StatusSignal) {
        if self.shown != Some(signal) {
            self.shown = Some(signal);
            self.status_light.show(signal);
        }
    }

    /// Observed trigger state; always Idle outside `tick`
    pub fn trigger_state(&self) -> TriggerState {
        self.state
    }

    /// Work queued for later ticks
    pub fn pending(&self) -> TriggerSet {
        let mut pending = self.pending;
        pending.merge(self.triggers.peek());
        pending
    }

    pub fn cache(&self) -> &AuthorizationCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn last_tag(&self) -> Option<TagId> {
        self.last_tag
    }

    pub fn is_offline(&self) -> bool {
        self.cache.is_offline()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    pub fn client(&self) -> &AuthorityClient {
        &self.client
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

fn log_reply(command: AdminCommand, reply: &AdminReply) {
    match reply {
        AdminReply::Done => tracing::info!(?command, "admin command applied"),
        AdminReply::Status(status) => match serde_json::to_string(status) {
            Ok(json) => tracing::info!(status = %json, "node status"),
            Err(_) => tracing::info!(status = %status, "node status"),
        },
        AdminReply::Tags(tags) => {
            let list: Vec<String> = tags.iter().map(ToString::to_string).collect();
            tracing::info!(count = tags.len(), tags = %list.join(","), "cached tags");
        }
        AdminReply::Loaded(tags) => tracing::info!(tags, "persisted tags loaded into memory"),
        AdminReply::Persisted(None) => tracing::info!("no persisted authorization cache"),
        AdminReply::Persisted(Some(snapshot)) => match snapshot.to_json_line() {
            Ok(line) => tracing::info!(cache = %line.trim_end(), "persisted cache"),
            Err(e) => tracing::warn!(error = %e, "persisted cache unprintable"),
        },
        AdminReply::Refused(reason) => tracing::warn!(?command, %reason, "admin command refused"),
    }
}
