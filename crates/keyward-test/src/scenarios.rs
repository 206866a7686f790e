//! End-to-end node scenarios

use std::time::Duration;

use keyward_cache::MemoryStore;
use keyward_core::{ContactPolarity, DeviceMode, SessionId, StatusSignal, TagId, Trigger, TriggerState};
use keyward_runtime::{AdminCommand, AdminReply};
use proptest::prelude::*;

use crate::{sim_config, NodeHarness, SimAuthority};

fn persisted(tags: &[u32], hash: &str) -> MemoryStore {
    let list: Vec<String> = tags.iter().map(u32::to_string).collect();
    MemoryStore::with_contents(format!(
        "{{\"authorised_tags\":[{}],\"authorised_tags_hash\":\"{hash}\"}}\n",
        list.join(",")
    ))
}

fn interlock_with_session(holder: u32) -> NodeHarness {
    let authority = SimAuthority::new();
    authority.grant(holder, Some("S1"));
    let mut h = NodeHarness::for_mode(DeviceMode::Interlock, authority);
    h.present(holder);
    h
}

#[test]
fn interlock_holder_reswipe_ends_session() {
    let mut h = interlock_with_session(1);

    let session = h.node.sessions().active().cloned().unwrap();
    assert_eq!(session.id, SessionId::new("S1"));
    assert_eq!(session.holder, TagId(1));
    assert_eq!(h.contact.level(), Some(true));
    assert_eq!(h.heartbeat_timer.period(), Some(Duration::from_secs(60)));
    assert_eq!(h.status.last(), Some(StatusSignal::SessionActive));

    h.advance(Duration::from_secs(10));
    h.present(1);

    assert!(h.node.sessions().active().is_none());
    assert_eq!(h.contact.level(), Some(false));
    assert_eq!(h.heartbeat_timer.period(), None);
    assert_eq!(
        h.authority.last_request().as_deref(),
        Some("/api/interlock/session/S1/end/1/")
    );
    assert_eq!(h.authority.count("/check/"), 1);
    assert_eq!(h.node.last_tag(), None);
}

#[test]
fn interlock_bystander_ends_session_without_authorization() {
    let mut h = interlock_with_session(1);

    h.advance(Duration::from_secs(10));
    h.present(2);

    assert_eq!(h.authority.count("/check/2/"), 0);
    assert_eq!(
        h.authority.last_request().as_deref(),
        Some("/api/interlock/session/S1/end/2/")
    );
    assert!(!h.node.sessions().is_engaged());
}

#[test]
fn interlock_denied_swipe_changes_nothing() {
    let mut h = NodeHarness::for_mode(DeviceMode::Interlock, SimAuthority::new());
    h.present(3);

    assert!(h.node.sessions().active().is_none());
    assert_eq!(h.contact.rising_edges(), 0);
    assert!(h.status.signals().contains(&StatusSignal::Denied));
}

#[test]
fn heartbeat_timer_follows_session() {
    let authority = SimAuthority::new();
    authority.grant(1, Some("S1"));
    let mut h = NodeHarness::for_mode(DeviceMode::Interlock, authority);

    assert_eq!(h.fire_heartbeat(), TriggerState::Idle);

    h.present(1);
    assert_eq!(h.fire_heartbeat(), TriggerState::SessionHeartbeatDue);
    assert_eq!(
        h.authority.last_request().as_deref(),
        Some("/api/interlock/session/S1/heartbeat/")
    );

    h.advance(Duration::from_secs(10));
    h.present(1);
    assert_eq!(h.fire_heartbeat(), TriggerState::Idle);
    assert_eq!(h.authority.count("/heartbeat/"), 1);
}

#[test]
fn three_failed_checkins_enter_offline_fallback() {
    let authority = SimAuthority::new();
    authority.set_down(true);
    let mut h = NodeHarness::new(sim_config(DeviceMode::Door), authority, persisted(&[7], "h7"));

    for _ in 0..3 {
        assert!(!h.node.is_offline());
        assert_eq!(h.fire_checkin(), TriggerState::CheckinDue);
    }
    assert_eq!(h.node.consecutive_failures(), 3);
    assert_eq!(h.status.last(), Some(StatusSignal::NetworkError));
    assert!(h.node.pending().contains(Trigger::OfflineFallback));

    assert_eq!(h.tick(), TriggerState::OfflineFallback);
    assert!(h.node.is_offline());

    // Authorizations now come from the local set only.
    h.authority.clear_requests();
    h.present(7);
    assert_eq!(h.contact.rising_edges(), 1);
    assert_eq!(h.node.last_tag(), Some(TagId(7)));

    h.advance(Duration::from_secs(6));
    h.present(8);
    assert_eq!(h.contact.rising_edges(), 1);
    assert!(h.authority.requests().is_empty());

    // Authority back: next check-in leaves offline fallback.
    h.authority.set_down(false);
    h.authority.set_tag_list(&[7], "h7");
    assert_eq!(h.fire_checkin(), TriggerState::CheckinDue);
    assert!(!h.node.is_offline());
    assert_eq!(h.node.consecutive_failures(), 0);
    assert!(h.node.pending().is_empty());

    h.advance(Duration::from_secs(6));
    h.present(7);
    assert_eq!(h.authority.count("/api/door/check/7/"), 1);
}

#[test]
fn server_errors_count_as_checkin_failures() {
    let authority = SimAuthority::new();
    authority.set_status(Some(500));
    let mut h = NodeHarness::for_mode(DeviceMode::KeyLocker, authority);

    for _ in 0..3 {
        h.fire_checkin();
    }
    assert_eq!(h.settle(4), vec![TriggerState::OfflineFallback]);
    assert!(h.node.is_offline());
    assert_eq!(h.authority.count("/api/keylocker/checkin/"), 3);
}

#[test]
fn offline_interlock_opens_local_session() {
    let authority = SimAuthority::new();
    authority.set_down(true);
    let mut h = NodeHarness::new(
        sim_config(DeviceMode::Interlock),
        authority,
        persisted(&[4], "h4"),
    );

    assert_eq!(h.node.handle_admin(AdminCommand::Offline), AdminReply::Done);
    assert_eq!(h.tick(), TriggerState::OfflineFallback);
    h.authority.clear_requests();

    h.present(4);
    let session = h.node.sessions().active().cloned().unwrap();
    assert!(session.id.is_local());
    assert!(h.node.sessions().is_engaged());

    assert_eq!(h.fire_heartbeat(), TriggerState::SessionHeartbeatDue);
    h.advance(Duration::from_secs(6));
    h.present(4);

    assert!(!h.node.sessions().is_engaged());
    assert!(h.authority.requests().is_empty());
}

#[test]
fn squelch_window_suppresses_repeat_reads() {
    let authority = SimAuthority::new();
    authority.grant(5, None);
    let mut config = sim_config(DeviceMode::Door);
    config.pacing = Duration::ZERO;
    config.pulse_dwell = Duration::ZERO;
    let mut h = NodeHarness::new(config, authority, MemoryStore::new());

    h.present(5);
    assert_eq!(h.authority.count("/check/5/"), 1);

    h.advance_to(2000);
    h.present(5);
    assert_eq!(h.authority.count("/check/5/"), 1);
    assert!(h.reader.is_empty());

    h.advance_to(5000);
    h.present(5);
    assert_eq!(h.authority.count("/check/5/"), 1);

    h.advance_to(5001);
    h.present(5);
    assert_eq!(h.authority.count("/check/5/"), 2);
    assert_eq!(h.contact.rising_edges(), 2);
}

#[test]
fn squelch_window_starts_after_the_pulse() {
    let authority = SimAuthority::new();
    authority.grant(5, None);
    let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

    h.present(5);
    let handled = h.now();
    assert!(handled.as_millis() >= 5_000);
    assert_eq!(h.authority.count("/check/5/"), 1);

    // Same badge still on the reader after a full dwell.
    h.present(5);
    assert_eq!(h.authority.count("/check/5/"), 1);
    assert_eq!(h.contact.rising_edges(), 1);
    assert!(h.reader.is_empty());

    h.advance_to(handled.as_millis() + 5000);
    h.present(5);
    assert_eq!(h.authority.count("/check/5/"), 1);

    h.advance(Duration::from_millis(1));
    h.present(5);
    assert_eq!(h.authority.count("/check/5/"), 2);
    assert_eq!(h.contact.rising_edges(), 2);
}

#[test]
fn checkin_refresh_is_hash_gated() {
    let authority = SimAuthority::new();
    authority.set_tag_list(&[1, 2], "h1");
    let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

    assert_eq!(h.fire_checkin(), TriggerState::CheckinDue);
    assert!(h.node.pending().contains(Trigger::CacheRefresh));
    assert_eq!(h.tick(), TriggerState::CacheRefreshDue);
    assert_eq!(h.store.writes(), 1);
    assert_eq!(h.node.cache().current_hash(), "h1");
    let bytes = h.store.contents();

    // Same hash: no refresh scheduled.
    assert_eq!(h.fire_checkin(), TriggerState::CheckinDue);
    assert!(h.node.pending().is_empty());

    // Forced refresh with the same hash writes nothing.
    h.node.handle_admin(AdminCommand::Refresh);
    assert_eq!(h.tick(), TriggerState::CacheRefreshDue);
    assert_eq!(h.store.writes(), 1);
    assert_eq!(h.store.contents(), bytes);

    h.authority.set_tag_list(&[3], "h2");
    h.fire_checkin();
    assert_eq!(h.tick(), TriggerState::CacheRefreshDue);
    assert_eq!(h.store.writes(), 2);
    assert!(h.node.cache().is_authorized(TagId(3)));
    assert!(!h.node.cache().is_authorized(TagId(1)));
}

#[test]
fn corrupted_frame_is_dropped_without_squelch() {
    let authority = SimAuthority::new();
    authority.grant(6, None);
    let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

    h.present_raw(&[0x00, 0x00, 0x00, 0x06, 0xFF, 0x42]);
    assert!(h.authority.requests().is_empty());
    assert!(h.reader.is_empty());

    h.present(6);
    assert_eq!(h.authority.count("/check/6/"), 1);
}

#[test]
fn partial_frame_waits_for_more_bytes() {
    let authority = SimAuthority::new();
    authority.grant(6, None);
    let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

    h.present_raw(&[0x00, 0x00, 0x00]);
    assert_eq!(h.reader.len(), 3);
    h.present_raw(&[0x06, 0x06]);
    assert_eq!(h.authority.count("/check/6/"), 1);
}

#[test]
fn stray_byte_expires_before_next_swipe() {
    let authority = SimAuthority::new();
    authority.grant(6, None);
    let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

    h.present_raw(&[0x42]);
    assert_eq!(h.reader.len(), 1);

    for _ in 0..3 {
        h.advance(Duration::from_secs(1));
        h.tick();
    }
    assert!(h.reader.is_empty());
    assert_eq!(h.node.decoder().stats().partials_expired, 1);

    h.present(6);
    assert_eq!(h.authority.count("/check/6/"), 1);
    assert_eq!(h.contact.rising_edges(), 1);
}

#[test]
fn denied_swipe_signals_and_holds() {
    let mut h = NodeHarness::for_mode(DeviceMode::Door, SimAuthority::new());
    let before = h.now();
    h.present(3);

    assert_eq!(
        h.status.signals(),
        vec![StatusSignal::Idle, StatusSignal::Reading, StatusSignal::Denied]
    );
    assert!(h.now() - before >= Duration::from_secs(1));
    assert_eq!(h.contact.rising_edges(), 0);

    h.advance(Duration::from_secs(6));
    h.tick();
    assert_eq!(h.status.last(), Some(StatusSignal::Idle));
}

#[test]
fn admin_end_releases_without_report() {
    let authority = SimAuthority::new();
    authority.grant(9, Some("S9"));
    let mut h = NodeHarness::for_mode(DeviceMode::Interlock, authority);

    assert_eq!(h.node.handle_admin(AdminCommand::AuthAs(TagId(9))), AdminReply::Done);
    assert!(h.node.sessions().is_engaged());

    match h.node.handle_admin(AdminCommand::Status) {
        AdminReply::Status(status) => {
            assert_eq!(status.session, Some(SessionId::new("S9")));
            assert_eq!(status.session_holder, Some(TagId(9)));
            assert!(status.engaged);
        }
        other => panic!("unexpected reply {other:?}"),
    }

    assert_eq!(h.node.handle_admin(AdminCommand::End), AdminReply::Done);
    assert!(!h.node.sessions().is_engaged());
    assert_eq!(h.heartbeat_timer.period(), None);
    assert_eq!(h.authority.count("/end/"), 0);
}

#[test]
fn admin_clear_and_tags() {
    let authority = SimAuthority::new();
    authority.set_down(true);
    let mut h = NodeHarness::new(sim_config(DeviceMode::Door), authority, persisted(&[1, 2], "h"));

    assert_eq!(
        h.node.handle_admin(AdminCommand::Tags),
        AdminReply::Tags(vec![TagId(1), TagId(2)])
    );
    h.node.handle_admin(AdminCommand::Offline);
    h.tick();
    assert!(h.node.is_offline());

    assert_eq!(h.node.handle_admin(AdminCommand::Clear), AdminReply::Done);
    assert!(!h.node.is_offline());
    assert_eq!(h.node.handle_admin(AdminCommand::Tags), AdminReply::Tags(vec![]));
}

#[test]
fn admin_load_and_cache_read_persisted_tags() {
    let authority = SimAuthority::new();
    authority.set_down(true);
    let mut h = NodeHarness::new(sim_config(DeviceMode::Door), authority, persisted(&[1, 2], "h"));

    h.node.handle_admin(AdminCommand::Clear);
    assert_eq!(h.node.handle_admin(AdminCommand::Tags), AdminReply::Tags(vec![]));

    assert_eq!(h.node.handle_admin(AdminCommand::Load), AdminReply::Loaded(2));
    assert!(!h.node.is_offline());
    assert_eq!(
        h.node.handle_admin(AdminCommand::Tags),
        AdminReply::Tags(vec![TagId(1), TagId(2)])
    );

    match h.node.handle_admin(AdminCommand::Cache) {
        AdminReply::Persisted(Some(snapshot)) => {
            assert_eq!(snapshot.hash(), "h");
            assert_eq!(snapshot.tags().iter().collect::<Vec<_>>(), vec![TagId(1), TagId(2)]);
        }
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(h.authority.requests().is_empty());

    let mut empty = NodeHarness::for_mode(DeviceMode::Door, SimAuthority::new());
    assert_eq!(empty.node.handle_admin(AdminCommand::Cache), AdminReply::Persisted(None));
    assert_eq!(empty.node.handle_admin(AdminCommand::Load), AdminReply::Loaded(0));
}

#[test]
fn active_low_contact_pulses_low() {
    let authority = SimAuthority::new();
    authority.grant(1, None);
    let mut config = sim_config(DeviceMode::Door);
    config.contact_polarity = ContactPolarity::ActiveLow;
    let mut h = NodeHarness::new(config, authority, MemoryStore::new());

    h.present(1);
    assert_eq!(h.contact.levels(), vec![true, false, true]);
}

#[test]
fn grant_pulse_holds_for_dwell() {
    let authority = SimAuthority::new();
    authority.grant(1, None);
    let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

    let before = h.now();
    h.present(1);
    assert!(h.now() - before >= Duration::from_secs(5));
    assert_eq!(h.contact.levels(), vec![false, true, false]);
    assert_eq!(h.node.last_tag(), Some(TagId(1)));
}

#[test]
fn random_outages_keep_loop_consistent() {
    for seed in 0..16 {
        let authority = SimAuthority::new().with_faults(seed, 0.5);
        authority.set_tag_list(&[1], "h");
        let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

        for _ in 0..40 {
            h.fire_checkin();
            h.settle(4);
            assert_eq!(h.node.trigger_state(), TriggerState::Idle);
            if h.node.is_offline() {
                assert!(h.node.consecutive_failures() >= 3, "seed {seed}");
            }
            assert_eq!(h.contact.level(), Some(false));
        }
    }
}

proptest! {
    #[test]
    fn prop_bad_checksum_never_reaches_authority(
        payload in proptest::array::uniform4(any::<u8>()),
        delta in 1u8..=255,
    ) {
        let authority = SimAuthority::new();
        authority.grant(u32::from_be_bytes(payload), None);
        let mut h = NodeHarness::for_mode(DeviceMode::Door, authority);

        let checksum = payload.iter().fold(0u8, |acc, b| acc ^ b) ^ delta;
        let mut frame = payload.to_vec();
        frame.push(checksum);
        h.present_raw(&frame);

        prop_assert!(h.authority.requests().is_empty());
        prop_assert!(h.node.last_tag().is_none());
    }
}
