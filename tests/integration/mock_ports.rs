//! Mock port adapters for integration tests.
//!
//! Each mock records what the lifecycle asked of it so tests can assert on
//! the full interaction without radios, flash or sockets.

use core::time::Duration;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use plantbot::app::credentials::Credentials;
use plantbot::app::events::AppEvent;
use plantbot::app::ports::{
    ClockPort, EventSink, LinkError, PeerEvent, ProvisioningError, ProvisioningField,
    ProvisioningPort, ResetPort, StationPort, StorageError, StoragePort, TransportError,
    UpstreamTransport,
};

// ── Clock ─────────────────────────────────────────────────────

/// Returns immediately and remembers every requested sleep.
#[derive(Default)]
pub struct RecordingClock {
    pub sleeps: Vec<Duration>,
}

#[allow(dead_code)]
impl RecordingClock {
    pub fn count(&self, duration: Duration) -> usize {
        self.sleeps.iter().filter(|d| **d == duration).count()
    }
}

impl ClockPort for RecordingClock {
    async fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}

// ── Storage ───────────────────────────────────────────────────

/// In-memory store whose contents stay visible to the test after the
/// orchestrator takes ownership of a clone.
#[derive(Clone, Default)]
pub struct SharedStorage {
    values: Rc<RefCell<HashMap<(String, String), Vec<u8>>>>,
    fail_writes: Rc<Cell<bool>>,
}

#[allow(dead_code)]
impl SharedStorage {
    pub fn get(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.values
            .borrow()
            .get(&(namespace.into(), key.into()))
            .cloned()
    }

    pub fn put(&self, namespace: &str, key: &str, data: &[u8]) {
        self.values
            .borrow_mut()
            .insert((namespace.into(), key.into()), data.to_vec());
    }

    pub fn credential_record(&self) -> Option<String> {
        self.get("wifi", "creds")
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl StoragePort for SharedStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let values = self.values.borrow();
        let data = values
            .get(&(namespace.into(), key.into()))
            .ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Full);
        }
        self.put(namespace, key, data);
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.values
            .borrow_mut()
            .remove(&(namespace.into(), key.into()));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.values
            .borrow()
            .contains_key(&(namespace.into(), key.into()))
    }
}

// ── Station ───────────────────────────────────────────────────

/// Station whose link comes up on the N-th poll after a connect request.
pub struct MockStation {
    up_after_polls: Option<u32>,
    requested: bool,
    lost: bool,
    polls: Cell<u32>,
    pub connect_requests: Vec<String>,
    pub disconnects: u32,
}

#[allow(dead_code)]
impl MockStation {
    pub fn up_after(polls: u32) -> Self {
        Self {
            up_after_polls: Some(polls),
            requested: false,
            lost: false,
            polls: Cell::new(0),
            connect_requests: Vec::new(),
            disconnects: 0,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            up_after_polls: None,
            ..Self::up_after(0)
        }
    }

    /// Polls since the last connect request.
    pub fn polls(&self) -> u32 {
        self.polls.get()
    }

    pub fn drop_link(&mut self) {
        self.lost = true;
    }
}

impl StationPort for MockStation {
    fn begin_connect(&mut self, credentials: &Credentials) -> Result<(), LinkError> {
        self.connect_requests.push(credentials.network_id().into());
        self.requested = true;
        self.lost = false;
        self.polls.set(0);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        if !self.requested {
            return false;
        }
        let n = self.polls.get() + 1;
        self.polls.set(n);
        !self.lost && self.up_after_polls.is_some_and(|k| n >= k)
    }

    fn disconnect(&mut self) {
        self.requested = false;
        self.disconnects += 1;
    }
}

// ── Provisioning peer ─────────────────────────────────────────

/// Replays a fixed sequence of peer events.  Running out of script means
/// the lifecycle waited for something the test never planned.
#[derive(Default)]
pub struct ScriptedPeer {
    script: VecDeque<PeerEvent>,
    connected: bool,
    advertising: bool,
    pub advertised: u32,
    pub stops: u32,
    pub notified: Vec<String>,
    /// Every notification fails as if the peer stopped listening.
    pub fail_notify: bool,
}

#[allow(dead_code)]
impl ScriptedPeer {
    pub fn new(script: impl IntoIterator<Item = PeerEvent>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

pub fn write(field: ProvisioningField, data: &str) -> PeerEvent {
    PeerEvent::Write {
        field,
        data: data.as_bytes().to_vec(),
    }
}

/// Connect and write all three fields.
pub fn full_capture(id: &str, secret: &str, token: &str) -> Vec<PeerEvent> {
    vec![
        PeerEvent::Connected,
        write(ProvisioningField::NetworkId, id),
        write(ProvisioningField::NetworkSecret, secret),
        write(ProvisioningField::SessionToken, token),
    ]
}

impl ProvisioningPort for ScriptedPeer {
    fn start_advertising(&mut self, _name: &str) -> Result<(), ProvisioningError> {
        self.advertised += 1;
        self.advertising = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.advertising = false;
        self.connected = false;
    }

    async fn next_event(&mut self) -> PeerEvent {
        let Some(event) = self.script.pop_front() else {
            panic!("peer script exhausted");
        };
        match event {
            PeerEvent::Connected => self.connected = true,
            PeerEvent::Disconnected => self.connected = false,
            PeerEvent::Write { .. } => {}
        }
        event
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), ProvisioningError> {
        if !self.connected || self.fail_notify {
            return Err(ProvisioningError::NotifyFailed);
        }
        self.notified
            .push(String::from_utf8_lossy(payload).into_owned());
        Ok(())
    }
}

// ── Upstream transport ────────────────────────────────────────

/// Delivers queued receive results, then reports the connection closed.
#[derive(Default)]
pub struct ScriptedTransport {
    inbox: VecDeque<Result<String, TransportError>>,
    connected: bool,
    pub refuse_connect: bool,
    pub fail_send: bool,
    pub endpoints: Vec<String>,
    pub sent: Vec<String>,
    pub closes: u32,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn with_inbox(inbox: impl IntoIterator<Item = Result<String, TransportError>>) -> Self {
        Self {
            inbox: inbox.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl UpstreamTransport for ScriptedTransport {
    async fn connect(&mut self, endpoint: &str) -> Result<(), TransportError> {
        self.endpoints.push(endpoint.into());
        if self.refuse_connect {
            return Err(TransportError::ConnectFailed);
        }
        self.connected = true;
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.fail_send {
            return Err(TransportError::SendFailed);
        }
        self.sent.push(text.into());
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        self.inbox.pop_front().unwrap_or(Err(TransportError::Closed))
    }

    fn close(&mut self) {
        self.connected = false;
        self.closes += 1;
    }
}

// ── Reset input ───────────────────────────────────────────────

/// One entry per cycle; an empty queue means "not pressed".
#[derive(Default)]
pub struct ResetQueue {
    presses: VecDeque<bool>,
}

#[allow(dead_code)]
impl ResetQueue {
    pub fn press_next(&mut self) {
        self.presses.push_back(true);
    }
}

impl ResetPort for ResetQueue {
    fn reset_requested(&mut self) -> bool {
        self.presses.pop_front().unwrap_or(false)
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
