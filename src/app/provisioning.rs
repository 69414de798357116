//! Provisioning channel: captures credentials and a session token from a
//! nearby peer.
//!
//! ```text
//!   activate() ──▶ ProvisioningSession ──▶ await_credential_write()
//!                        │                         │
//!                        │◀── notify_status() ─────┘
//!                        └──▶ await_disconnect() / drop ⇒ stop
//! ```
//!
//! The three writable fields may arrive in any order; a repeated write to a
//! field replaces the earlier value.  Nothing is handed out until all three
//! hold a valid value.

use core::fmt;

use log::{info, warn};

use super::credentials::{
    CredentialError, Credentials, NETWORK_ID_MAX, NETWORK_SECRET_MAX, SESSION_TOKEN_MAX,
    SessionToken, text_from_bytes, validate_network_id, validate_network_secret,
};
use super::ports::{PeerEvent, ProvisioningError, ProvisioningField, ProvisioningPort};

// ───────────────────────────────────────────────────────────────
// Status notifications
// ───────────────────────────────────────────────────────────────

/// Progress pushed to the provisioning peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStatus {
    Starting,
    Failed,
    Connected,
}

impl ProvisioningStatus {
    pub fn payload(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "connecting:starting",
            Self::Failed => "connecting:failed",
            Self::Connected => "connecting:connected",
        }
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CredentialError> for ProvisioningError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::TooLong { .. } => Self::DataTooLong,
            CredentialError::InvalidUtf8 => Self::InvalidUtf8,
            CredentialError::EmptyNetworkId
            | CredentialError::EmptyToken
            | CredentialError::ControlCharacter => Self::InvalidValue,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Capture buffer
// ───────────────────────────────────────────────────────────────

/// Accumulates field writes until a complete set is present.
#[derive(Default)]
pub struct CredentialCapture {
    network_id: Option<heapless::String<NETWORK_ID_MAX>>,
    network_secret: Option<heapless::String<NETWORK_SECRET_MAX>>,
    token: Option<SessionToken>,
}

impl CredentialCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record one write.  Rejected writes leave the capture
    /// unchanged.
    pub fn accept(&mut self, field: ProvisioningField, raw: &[u8]) -> Result<(), ProvisioningError> {
        match field {
            ProvisioningField::NetworkId => {
                let text = text_from_bytes(raw, NETWORK_ID_MAX)?;
                validate_network_id(text)?;
                self.network_id = Some(copy_bounded(text)?);
            }
            ProvisioningField::NetworkSecret => {
                let text = text_from_bytes(raw, NETWORK_SECRET_MAX)?;
                validate_network_secret(text)?;
                self.network_secret = Some(copy_bounded(text)?);
            }
            ProvisioningField::SessionToken => {
                let text = text_from_bytes(raw, SESSION_TOKEN_MAX)?;
                self.token = Some(SessionToken::new(text)?);
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.network_id.is_some() && self.network_secret.is_some() && self.token.is_some()
    }

    /// Number of fields holding a value.
    pub fn captured_fields(&self) -> usize {
        usize::from(self.network_id.is_some())
            + usize::from(self.network_secret.is_some())
            + usize::from(self.token.is_some())
    }

    /// Hand out the complete set, or `None` while any field is missing.
    pub fn take(&mut self) -> Option<(Credentials, SessionToken)> {
        if !self.is_complete() {
            return None;
        }
        let id = self.network_id.take()?;
        let secret = self.network_secret.take()?;
        let token = self.token.take()?;
        let creds = Credentials::new(&id, &secret).ok()?;
        Some((creds, token))
    }
}

fn copy_bounded<const N: usize>(text: &str) -> Result<heapless::String<N>, ProvisioningError> {
    let mut out = heapless::String::new();
    out.push_str(text)
        .map_err(|_| ProvisioningError::DataTooLong)?;
    Ok(out)
}

// ───────────────────────────────────────────────────────────────
// Channel
// ───────────────────────────────────────────────────────────────

pub struct ProvisioningChannel<P: ProvisioningPort> {
    port: P,
    device_name: heapless::String<{ crate::config::DEVICE_NAME_MAX }>,
}

impl<P: ProvisioningPort> ProvisioningChannel<P> {
    pub fn new(port: P, device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            port,
            device_name: name,
        }
    }

    /// Start advertising and suspend until a peer connects.
    pub async fn activate(&mut self) -> Result<ProvisioningSession<'_, P>, ProvisioningError> {
        self.port.start_advertising(&self.device_name)?;
        info!("Provisioning: advertising as '{}'", self.device_name);

        loop {
            match self.port.next_event().await {
                PeerEvent::Connected => {
                    info!("Provisioning: peer connected");
                    return Ok(ProvisioningSession {
                        port: &mut self.port,
                        capture: CredentialCapture::new(),
                        peer_connected: true,
                    });
                }
                PeerEvent::Disconnected => {}
                PeerEvent::Write { field, .. } => {
                    warn!("Provisioning: ignoring {:?} write with no peer", field);
                }
            }
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

/// One connected peer.  Dropping the session stops the channel.
pub struct ProvisioningSession<'a, P: ProvisioningPort> {
    port: &'a mut P,
    capture: CredentialCapture,
    peer_connected: bool,
}

impl<P: ProvisioningPort> ProvisioningSession<'_, P> {
    /// Suspend until every field holds a valid value.
    ///
    /// Returns [`ProvisioningError::Incomplete`] if the peer disconnects
    /// first; whatever was captured is discarded.
    pub async fn await_credential_write(
        &mut self,
    ) -> Result<(Credentials, SessionToken), ProvisioningError> {
        loop {
            if let Some(captured) = self.capture.take() {
                info!(
                    "Provisioning: captured credentials for '{}'",
                    captured.0.network_id()
                );
                return Ok(captured);
            }
            if !self.peer_connected {
                return Err(ProvisioningError::Incomplete);
            }

            match self.port.next_event().await {
                PeerEvent::Write { field, data } => match self.capture.accept(field, &data) {
                    Ok(()) => info!("Provisioning: {:?} written (len={})", field, data.len()),
                    Err(e) => warn!("Provisioning: rejected {:?} write ({})", field, e),
                },
                PeerEvent::Disconnected => {
                    warn!(
                        "Provisioning: peer left with {}/3 fields written",
                        self.capture.captured_fields()
                    );
                    self.peer_connected = false;
                    self.capture = CredentialCapture::new();
                }
                PeerEvent::Connected => {}
            }
        }
    }

    /// Best-effort status push.  Delivery failures are logged, never
    /// raised; the return value says whether the peer was reached.
    pub fn notify_status(&mut self, status: ProvisioningStatus) -> bool {
        match self.port.notify(status.payload()) {
            Ok(()) => {
                info!("Provisioning: notified '{}'", status);
                true
            }
            Err(e) => {
                warn!("Provisioning: notify '{}' failed ({})", status, e);
                false
            }
        }
    }

    /// Suspend until the peer disconnects.  No timeout.
    pub async fn await_disconnect(&mut self) {
        while self.peer_connected {
            if self.port.next_event().await == PeerEvent::Disconnected {
                info!("Provisioning: peer disconnected");
                self.peer_connected = false;
            }
        }
    }

    pub fn is_peer_connected(&self) -> bool {
        self.peer_connected
    }
}

impl<P: ProvisioningPort> Drop for ProvisioningSession<'_, P> {
    fn drop(&mut self) {
        self.port.stop();
    }
}
