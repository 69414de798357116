//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DeviceOrchestrator (domain)
//! ```
//!
//! Driven adapters (radio, storage, websocket, clock, button) implement these
//! traits.  The [`DeviceOrchestrator`](super::orchestrator::DeviceOrchestrator)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! Every suspension point of the lifecycle is an `async` port method.  The
//! whole lifecycle runs as one cooperative task, so these futures are never
//! required to be `Send`.
//!
//! ## Security notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StoragePort** implementations SHOULD encrypt sensitive keys.
//! - All port errors are typed; callers must handle every variant explicitly.

#![allow(async_fn_in_trait)]

use core::time::Duration;

use super::credentials::Credentials;
use super::events::AppEvent;
use crate::config::DeviceConfig;

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: domain → timer)
// ───────────────────────────────────────────────────────────────

/// Cooperative sleep.  Every idle wait in the lifecycle goes through here,
/// which lets host tests record the schedule instead of waiting it out.
pub trait ClockPort {
    async fn sleep(&mut self, duration: Duration);
}

// ───────────────────────────────────────────────────────────────
// Reset port (driven adapter: button → domain)
// ───────────────────────────────────────────────────────────────

/// Manual-reset input, polled once per orchestrator cycle.
pub trait ResetPort {
    /// Returns `true` once per press.  Presses between polls are latched.
    fn reset_requested(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Station port (driven adapter: domain ↔ WiFi STA interface)
// ───────────────────────────────────────────────────────────────

/// Station-mode network interface.
pub trait StationPort {
    /// Activate the interface and issue a connect request.  Returns as soon
    /// as the request is accepted; completion is observed via
    /// [`is_connected`](Self::is_connected).
    fn begin_connect(&mut self, credentials: &Credentials) -> Result<(), LinkError>;

    /// Whether the interface currently has a usable network attachment.
    fn is_connected(&self) -> bool;

    /// Drop any attachment.  Safe to call when already disconnected.
    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Provisioning port (driven adapter: domain ↔ BLE GATT server)
// ───────────────────────────────────────────────────────────────

/// Which writable provisioning characteristic a write targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningField {
    NetworkId,
    NetworkSecret,
    SessionToken,
}

/// Something a provisioning peer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected,
    Disconnected,
    /// Raw bytes written to one of the writable characteristics.
    Write {
        field: ProvisioningField,
        data: Vec<u8>,
    },
}

/// Short-range provisioning service (advertising + GATT).
pub trait ProvisioningPort {
    /// Begin advertising the provisioning service under `name`.
    fn start_advertising(&mut self, name: &str) -> Result<(), ProvisioningError>;

    /// Stop advertising and drop any connected peer.
    fn stop(&mut self);

    /// Suspend until the next peer event.
    async fn next_event(&mut self) -> PeerEvent;

    /// Push `payload` on the status characteristic to the connected peer.
    fn notify(&mut self, payload: &[u8]) -> Result<(), ProvisioningError>;
}

// ───────────────────────────────────────────────────────────────
// Upstream transport port (driven adapter: domain ↔ websocket)
// ───────────────────────────────────────────────────────────────

/// Message-oriented connection to the remote control server.
pub trait UpstreamTransport {
    /// Open a connection to `endpoint`.  Any previous connection is closed.
    async fn connect(&mut self, endpoint: &str) -> Result<(), TransportError>;

    /// Send one text message.
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Suspend until the next inbound text message.
    ///
    /// [`TransportError::Closed`] means the connection is gone for good;
    /// every other error is transient.
    async fn recv(&mut self) -> Result<String, TransportError>;

    /// Close the connection.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.  Adapters
/// decide where they go (serial log, test recorder, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists device configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges should be rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`DeviceConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<DeviceConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for credentials and config.
///
/// # Security
///
/// - Implementations SHOULD encrypt sensitive keys (WiFi passwords).
///   On ESP32, prefer the encrypted NVS partition for these.
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic; no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; the file backend writes
///   a temporary file and renames it over the target.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Encryption or decryption failed (wrong key, corrupted blob).
    EncryptionError,
}

/// Errors from [`StationPort`] and the attach procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The driver refused to start or rejected the connect request.
    Driver(&'static str),
    /// The link never came up within the poll budget.
    AttachTimeout { attempts: u8 },
}

/// Errors from [`UpstreamTransport`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish the connection.
    ConnectFailed,
    /// A message could not be sent.
    SendFailed,
    /// A receive attempt failed; the connection may still be usable.
    ReceiveFailed,
    /// The connection dropped and came back; the server has forgotten
    /// this client.
    Reconnected,
    /// The connection was closed at a lower layer and cannot be reused.
    Closed,
}

/// Errors from the provisioning channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningError {
    /// BLE stack could not be initialised or advertising failed to start.
    StackInitFailed,
    /// A written value exceeded the field's maximum length.
    DataTooLong,
    /// A written value was not valid UTF-8.
    InvalidUtf8,
    /// A written value contained control characters or was empty.
    InvalidValue,
    /// The peer disconnected before every field was written.
    Incomplete,
    /// A status notification could not be delivered.
    NotifyFailed,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::EncryptionError => write!(f, "encryption error"),
        }
    }
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Driver(msg) => write!(f, "driver error: {}", msg),
            Self::AttachTimeout { attempts } => {
                write!(f, "link not up after {} polls", attempts)
            }
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SendFailed => write!(f, "send failed"),
            Self::ReceiveFailed => write!(f, "receive failed"),
            Self::Reconnected => write!(f, "reconnected"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

impl core::fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StackInitFailed => write!(f, "BLE stack initialisation failed"),
            Self::DataTooLong => write!(f, "data exceeds maximum length"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Self::InvalidValue => write!(f, "invalid value"),
            Self::Incomplete => write!(f, "peer left before provisioning completed"),
            Self::NotifyFailed => write!(f, "status notification failed"),
        }
    }
}
