//! Integration tests for the connection lifecycle.
//!
//! Drives [`DeviceOrchestrator::run_cycle`] against the mock ports and
//! checks the observable results: what was stored, what the phone was told
//! and what went upstream.

use core::time::Duration;

use futures_lite::future::block_on;
use plantbot::app::events::AppEvent;
use plantbot::app::link::LinkState;
use plantbot::app::orchestrator::{CycleOutcome, DeviceOrchestrator, LifecycleState};
use plantbot::app::ports::{PeerEvent, StorageError};
use plantbot::app::provisioning::ProvisioningStatus;
use plantbot::app::session::SessionEnd;
use plantbot::config::DeviceConfig;
use plantbot::error::Error;

use crate::mock_ports::{
    MockStation, RecordingClock, RecordingSink, ResetQueue, ScriptedPeer, ScriptedTransport,
    SharedStorage, full_capture,
};

type Orchestrator =
    DeviceOrchestrator<SharedStorage, MockStation, ScriptedPeer, ScriptedTransport, ResetQueue>;

const AUTH_TOK1: &str = r#"{"action":"authenticate","payload":"tok1"}"#;

fn keep_credentials() -> DeviceConfig {
    DeviceConfig {
        wipe_credentials_on_boot: false,
        ..DeviceConfig::default()
    }
}

fn orchestrator(
    config: DeviceConfig,
    storage: &SharedStorage,
    station: MockStation,
    peer: ScriptedPeer,
    transport: ScriptedTransport,
) -> Orchestrator {
    DeviceOrchestrator::new(
        config,
        storage.clone(),
        station,
        peer,
        transport,
        ResetQueue::default(),
    )
}

fn with_failure_tail(mut events: Vec<PeerEvent>) -> Vec<PeerEvent> {
    events.push(PeerEvent::Disconnected);
    events
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_wipes_stored_credentials_by_default() {
    let storage = SharedStorage::default();
    storage.put("wifi", "creds", b"net1\npw1\n");
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::unreachable(),
        ScriptedPeer::default(),
        ScriptedTransport::default(),
    );
    let mut sink = RecordingSink::default();

    orch.boot(&mut sink);

    assert!(storage.credential_record().is_none());
    assert_eq!(orch.state(), LifecycleState::NoCredentials);
    assert!(sink.contains(&AppEvent::Booted {
        credentials_wiped: true
    }));
}

#[test]
fn boot_keeps_credentials_when_wipe_disabled() {
    let storage = SharedStorage::default();
    storage.put("wifi", "creds", b"net1\npw1\n");
    let mut orch = orchestrator(
        keep_credentials(),
        &storage,
        MockStation::unreachable(),
        ScriptedPeer::default(),
        ScriptedTransport::default(),
    );
    let mut sink = RecordingSink::default();

    orch.boot(&mut sink);

    assert_eq!(storage.credential_record().as_deref(), Some("net1\npw1\n"));
    assert_eq!(orch.state(), LifecycleState::Attaching);
}

// ── Provisioning ──────────────────────────────────────────────

#[test]
fn provisioning_end_to_end() {
    let storage = SharedStorage::default();
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::up_after(3),
        ScriptedPeer::new(full_capture("net1", "pw1", "tok1")),
        ScriptedTransport::with_inbox([Ok("hello".to_string())]),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();
    orch.boot(&mut sink);

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Provisioned {
            session: Some(SessionEnd {
                messages: 1,
                receive_errors: 0,
                reconnects: 0
            })
        }
    );
    assert_eq!(storage.credential_record().as_deref(), Some("net1\npw1\n"));
    assert_eq!(
        orch.provisioning().notified,
        ["connecting:starting", "connecting:connected"]
    );
    assert!(!orch.provisioning().is_advertising());
    assert_eq!(orch.link().station().connect_requests, ["net1"]);
    assert_eq!(orch.transport().endpoints, ["ws://192.168.1.152/"]);
    assert_eq!(orch.transport().sent, [AUTH_TOK1]);
    assert_eq!(orch.transport().closes, 1);

    // Two attach poll intervals plus one receive throttle.
    assert_eq!(clock.sleeps, [Duration::from_secs(1); 3]);

    assert_eq!(orch.state(), LifecycleState::Attached);
    assert!(orch.has_cached_token());
    assert!(sink.contains(&AppEvent::CredentialsCaptured));
    assert!(sink.contains(&AppEvent::SessionOpened));
    assert!(sink.contains(&AppEvent::MessageReceived("hello".into())));
    assert!(sink.contains(&AppEvent::SessionClosed { messages: 1 }));
}

#[test]
fn provisioning_attach_failure_keeps_credentials() {
    let storage = SharedStorage::default();
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::unreachable(),
        ScriptedPeer::new(with_failure_tail(full_capture("net1", "pw1", "tok1"))),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(outcome, CycleOutcome::ProvisionedAttachFailed);
    assert_eq!(
        orch.provisioning().notified,
        ["connecting:starting", "connecting:failed"]
    );
    // Not rolled back.
    assert_eq!(storage.credential_record().as_deref(), Some("net1\npw1\n"));
    assert_eq!(orch.link().station().polls(), 10);
    assert_eq!(clock.sleeps.len(), 9);
    assert!(orch.transport().endpoints.is_empty());
    assert_eq!(orch.provisioning().remaining(), 0);
    assert!(sink.contains(&AppEvent::AttachFailed { attempts: 10 }));
    assert!(!orch.has_cached_token());
}

#[test]
fn persist_failure_notifies_failed_and_skips_attach() {
    let storage = SharedStorage::default();
    storage.set_fail_writes(true);
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::new(with_failure_tail(full_capture("net1", "pw1", "tok1"))),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let result = block_on(orch.run_cycle(&mut clock, &mut sink));

    assert_eq!(result, Err(Error::Storage(StorageError::Full)));
    assert_eq!(orch.provisioning().notified, ["connecting:failed"]);
    assert!(orch.link().station().connect_requests.is_empty());
    assert!(storage.credential_record().is_none());
}

#[test]
fn undelivered_notifications_do_not_stop_provisioning() {
    let storage = SharedStorage::default();
    let mut peer = ScriptedPeer::new(full_capture("net1", "pw1", "tok1"));
    peer.fail_notify = true;
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::up_after(2),
        peer,
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert!(matches!(outcome, CycleOutcome::Provisioned { session: Some(_) }));
    assert_eq!(storage.credential_record().as_deref(), Some("net1\npw1\n"));
    assert_eq!(orch.link().station().connect_requests, ["net1"]);
    assert_eq!(orch.transport().sent, [AUTH_TOK1]);
    assert!(orch.provisioning().notified.is_empty());

    assert!(sink.contains(&AppEvent::StatusNotDelivered(ProvisioningStatus::Starting)));
    assert!(sink.contains(&AppEvent::StatusNotDelivered(ProvisioningStatus::Connected)));
    assert!(!sink.contains(&AppEvent::StatusNotified(ProvisioningStatus::Starting)));
    assert!(!sink.contains(&AppEvent::StatusNotified(ProvisioningStatus::Connected)));
}

#[test]
fn delivered_notifications_are_reported() {
    let storage = SharedStorage::default();
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::new(full_capture("net1", "pw1", "tok1")),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert!(sink.contains(&AppEvent::StatusNotified(ProvisioningStatus::Starting)));
    assert!(sink.contains(&AppEvent::StatusNotified(ProvisioningStatus::Connected)));
    assert!(!sink.contains(&AppEvent::StatusNotDelivered(ProvisioningStatus::Starting)));
}

#[test]
fn session_open_failure_leaves_device_attached() {
    let storage = SharedStorage::default();
    let mut transport = ScriptedTransport::default();
    transport.refuse_connect = true;
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::new(full_capture("net1", "pw1", "tok1")),
        transport,
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(outcome, CycleOutcome::Provisioned { session: None });
    assert_eq!(orch.state(), LifecycleState::Attached);
    assert!(!sink.contains(&AppEvent::SessionOpened));
}

// ── Re-attach ─────────────────────────────────────────────────

#[test]
fn stored_credentials_reattach_without_session() {
    let storage = SharedStorage::default();
    storage.put("wifi", "creds", b"net1\npw1\n");
    let mut orch = orchestrator(
        keep_credentials(),
        &storage,
        MockStation::up_after(2),
        ScriptedPeer::default(),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();
    orch.boot(&mut sink);

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert_eq!(outcome, CycleOutcome::Reattached { session: None });
    assert_eq!(orch.state(), LifecycleState::Attached);
    assert!(orch.transport().endpoints.is_empty());
    assert_eq!(orch.provisioning().advertised, 0);

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert_eq!(outcome, CycleOutcome::AlreadyAttached);
    assert_eq!(orch.link().station().connect_requests.len(), 1);
}

#[test]
fn reattach_failure_cools_down() {
    let storage = SharedStorage::default();
    storage.put("wifi", "creds", b"net1\npw1\n");
    let mut orch = orchestrator(
        keep_credentials(),
        &storage,
        MockStation::unreachable(),
        ScriptedPeer::default(),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(outcome, CycleOutcome::ReattachFailed);
    assert_eq!(clock.sleeps.last(), Some(&Duration::from_secs(60)));
    assert_eq!(clock.count(Duration::from_secs(1)), 9);
    // Credentials survive a failed re-attach.
    assert!(storage.credential_record().is_some());
    assert_eq!(orch.state(), LifecycleState::Attaching);
}

#[test]
fn lost_link_reattaches_and_reauthenticates_when_enabled() {
    let storage = SharedStorage::default();
    let config = DeviceConfig {
        reauthenticate_on_reattach: true,
        ..keep_credentials()
    };
    let mut orch = orchestrator(
        config,
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::new(full_capture("net1", "pw1", "tok1")),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert!(matches!(outcome, CycleOutcome::Provisioned { session: Some(_) }));

    orch.link_mut().station_mut().drop_link();
    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Reattached {
            session: Some(SessionEnd {
                messages: 0,
                receive_errors: 0,
                reconnects: 0
            })
        }
    );
    assert_eq!(orch.transport().sent, [AUTH_TOK1, AUTH_TOK1]);
    assert_eq!(orch.provisioning().advertised, 1);
}

#[test]
fn lost_link_reattaches_without_session_by_default() {
    let storage = SharedStorage::default();
    let mut orch = orchestrator(
        keep_credentials(),
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::new(full_capture("net1", "pw1", "tok1")),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    orch.link_mut().station_mut().drop_link();
    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(outcome, CycleOutcome::Reattached { session: None });
    assert_eq!(orch.transport().sent, [AUTH_TOK1]);
}

// ── Manual reset ──────────────────────────────────────────────

#[test]
fn manual_reset_clears_store_and_detaches() {
    let storage = SharedStorage::default();
    storage.put("wifi", "creds", b"net1\npw1\n");
    let mut orch = orchestrator(
        keep_credentials(),
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::default(),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();
    orch.boot(&mut sink);
    block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert_eq!(orch.link().state(), LinkState::Attached);

    orch.reset_input_mut().press_next();
    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(outcome, CycleOutcome::ManualReset);
    assert!(storage.credential_record().is_none());
    assert_eq!(orch.link().state(), LinkState::Disconnected);
    assert!(orch.link().station().disconnects >= 1);
    assert_eq!(orch.state(), LifecycleState::NoCredentials);
    assert!(sink.contains(&AppEvent::ManualReset));
}

#[test]
fn manual_reset_without_credentials_skips_provisioning() {
    let storage = SharedStorage::default();
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::default(),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();
    orch.boot(&mut sink);
    assert_eq!(orch.state(), LifecycleState::NoCredentials);

    orch.reset_input_mut().press_next();
    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(outcome, CycleOutcome::ManualReset);
    assert!(storage.credential_record().is_none());
    assert_eq!(orch.link().state(), LinkState::Disconnected);
    assert_eq!(orch.state(), LifecycleState::NoCredentials);
    // Reset ends the cycle before the provisioning rule runs.
    assert_eq!(orch.provisioning().advertised, 0);
}

#[test]
fn manual_reset_after_failed_provisioning_attach() {
    let storage = SharedStorage::default();
    let mut orch = orchestrator(
        DeviceConfig::default(),
        &storage,
        MockStation::unreachable(),
        ScriptedPeer::new(with_failure_tail(full_capture("net1", "pw1", "tok1"))),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert_eq!(outcome, CycleOutcome::ProvisionedAttachFailed);
    assert_eq!(orch.state(), LifecycleState::Attaching);
    assert!(storage.credential_record().is_some());

    orch.reset_input_mut().press_next();
    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();

    assert_eq!(outcome, CycleOutcome::ManualReset);
    assert!(storage.credential_record().is_none());
    assert_eq!(orch.link().state(), LinkState::Disconnected);
    assert_eq!(orch.state(), LifecycleState::NoCredentials);
    assert!(!orch.has_cached_token());
}

#[test]
fn manual_reset_drops_cached_token() {
    let storage = SharedStorage::default();
    let mut orch = orchestrator(
        keep_credentials(),
        &storage,
        MockStation::up_after(1),
        ScriptedPeer::new(full_capture("net1", "pw1", "tok1")),
        ScriptedTransport::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert!(orch.has_cached_token());

    orch.reset_input_mut().press_next();
    block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert!(!orch.has_cached_token());
    assert_eq!(orch.cycles(), 2);
}
