//! Integration tests for BLE credential capture as driven by the
//! orchestrator: partial sessions, rejected writes and re-advertising.

use futures_lite::future::block_on;
use plantbot::app::events::AppEvent;
use plantbot::app::orchestrator::{CycleOutcome, DeviceOrchestrator};
use plantbot::app::ports::{PeerEvent, ProvisioningField};
use plantbot::config::DeviceConfig;

use crate::mock_ports::{
    MockStation, RecordingClock, RecordingSink, ResetQueue, ScriptedPeer, ScriptedTransport,
    SharedStorage, full_capture, write,
};

/// Run one cycle with the given peer script and an always-reachable
/// network; returns the storage and the final peer state.
fn provision(script: Vec<PeerEvent>) -> (SharedStorage, ScriptedPeer, RecordingSink, Vec<String>) {
    let storage = SharedStorage::default();
    let mut orch = DeviceOrchestrator::new(
        DeviceConfig::default(),
        storage.clone(),
        MockStation::up_after(1),
        ScriptedPeer::new(script),
        ScriptedTransport::default(),
        ResetQueue::default(),
    );
    let mut clock = RecordingClock::default();
    let mut sink = RecordingSink::default();

    let outcome = block_on(orch.run_cycle(&mut clock, &mut sink)).unwrap();
    assert!(matches!(outcome, CycleOutcome::Provisioned { .. }));

    let sent = orch.transport().sent.clone();
    let peer = std::mem::take(orch.provisioning_mut());
    (storage, peer, sink, sent)
}

#[test]
fn partial_capture_then_disconnect_saves_nothing_and_readvertises() {
    let mut script = vec![
        PeerEvent::Connected,
        write(ProvisioningField::NetworkId, "net1"),
        write(ProvisioningField::NetworkSecret, "pw1"),
        PeerEvent::Disconnected,
    ];
    script.extend(full_capture("net2", "pw2", "tok2"));

    let (storage, peer, sink, sent) = provision(script);

    // The abandoned pair never reached storage; only the second one did.
    assert_eq!(storage.credential_record().as_deref(), Some("net2\npw2\n"));
    assert_eq!(peer.advertised, 2);
    assert!(peer.stops >= 2);
    assert!(sink.contains(&AppEvent::ProvisioningAbandoned));
    assert_eq!(sent, [r#"{"action":"authenticate","payload":"tok2"}"#]);
}

#[test]
fn fields_accepted_in_any_order() {
    let (storage, _, _, sent) = provision(vec![
        PeerEvent::Connected,
        write(ProvisioningField::SessionToken, "tok1"),
        write(ProvisioningField::NetworkSecret, "pw1"),
        write(ProvisioningField::NetworkId, "net1"),
    ]);
    assert_eq!(storage.credential_record().as_deref(), Some("net1\npw1\n"));
    assert_eq!(sent, [r#"{"action":"authenticate","payload":"tok1"}"#]);
}

#[test]
fn repeated_write_replaces_earlier_value() {
    let (storage, _, _, _) = provision(vec![
        PeerEvent::Connected,
        write(ProvisioningField::NetworkId, "first"),
        write(ProvisioningField::NetworkSecret, "pw1"),
        write(ProvisioningField::NetworkId, "second"),
        write(ProvisioningField::SessionToken, "tok1"),
    ]);
    assert_eq!(storage.credential_record().as_deref(), Some("second\npw1\n"));
}

#[test]
fn rejected_writes_do_not_count() {
    let too_long = "x".repeat(33);
    let (storage, peer, _, _) = provision(vec![
        PeerEvent::Connected,
        write(ProvisioningField::NetworkId, ""),
        write(ProvisioningField::NetworkId, &too_long),
        write(ProvisioningField::NetworkId, "net\n1"),
        PeerEvent::Write {
            field: ProvisioningField::NetworkSecret,
            data: vec![0xff, 0xfe],
        },
        write(ProvisioningField::SessionToken, ""),
        write(ProvisioningField::NetworkId, "net1"),
        write(ProvisioningField::NetworkSecret, "pw1"),
        write(ProvisioningField::SessionToken, "tok1"),
    ]);
    assert_eq!(storage.credential_record().as_deref(), Some("net1\npw1\n"));
    assert_eq!(peer.remaining(), 0);
}

#[test]
fn open_network_with_empty_secret() {
    let (storage, _, _, _) = provision(vec![
        PeerEvent::Connected,
        write(ProvisioningField::NetworkId, "cafe"),
        write(ProvisioningField::NetworkSecret, ""),
        write(ProvisioningField::SessionToken, "tok1"),
    ]);
    assert_eq!(storage.credential_record().as_deref(), Some("cafe\n\n"));
}

#[test]
fn writes_before_peer_connects_are_ignored() {
    let mut script = vec![write(ProvisioningField::NetworkId, "ghost")];
    script.extend(full_capture("net1", "pw1", "tok1"));
    let (storage, _, _, _) = provision(script);
    assert_eq!(storage.credential_record().as_deref(), Some("net1\npw1\n"));
}

#[test]
fn notifications_reach_peer_in_order() {
    let (_, peer, sink, _) = provision(full_capture("net1", "pw1", "tok1"));
    assert_eq!(peer.notified, ["connecting:starting", "connecting:connected"]);
    assert!(sink.contains(&AppEvent::PeerConnected));
    assert!(!peer.is_advertising());
}
