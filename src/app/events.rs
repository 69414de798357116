//! Outbound application events.
//!
//! The [`DeviceOrchestrator`](super::orchestrator::DeviceOrchestrator) emits
//! these through the [`EventSink`](super::ports::EventSink) port.  Adapters
//! on the other side decide what to do with them: log to serial, record
//! them in a test, etc.

use super::orchestrator::LifecycleState;
use super::provisioning::ProvisioningStatus;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The orchestrator has booted.
    Booted { credentials_wiped: bool },

    /// The lifecycle moved between states.
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// The reset button was pressed; credentials were wiped.
    ManualReset,

    /// A provisioning peer connected.
    PeerConnected,

    /// A complete credential + token set was captured and persisted.
    CredentialsCaptured,

    /// A provisioning session ended before every field was written.
    ProvisioningAbandoned,

    /// A status notification was pushed to the provisioning peer.
    StatusNotified(ProvisioningStatus),

    /// A status notification could not be delivered; the flow went on.
    StatusNotDelivered(ProvisioningStatus),

    /// Attach gave up after the full poll budget.
    AttachFailed { attempts: u8 },

    /// The upstream session is open and authenticated.
    SessionOpened,

    /// The upstream connection closed; the receive loop ended.
    SessionClosed { messages: u32 },

    /// A message arrived from the upstream server.
    MessageReceived(String),
}
