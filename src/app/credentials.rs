//! Network credentials, the session token, and their durable store.
//!
//! The persisted record is plain UTF-8 text, one field per line:
//!
//! ```text
//! <network_id>\n
//! <network_secret>\n
//! ```
//!
//! A record is only ever read back as a complete pair.  Anything shorter
//! than two lines, or holding a field that fails validation, reads as
//! "no credentials".

use core::fmt;

use heapless::String;
use log::{info, warn};

use super::ports::{StorageError, StoragePort};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const NETWORK_ID_MAX: usize = 32;
pub const NETWORK_SECRET_MAX: usize = 64;
pub const SESSION_TOKEN_MAX: usize = 64;

/// Longest possible encoded record (both fields plus two newlines).
pub const RECORD_MAX: usize = NETWORK_ID_MAX + NETWORK_SECRET_MAX + 2;

pub const CREDENTIAL_NAMESPACE: &str = "wifi";
pub const CREDENTIAL_KEY: &str = "creds";

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// Network id was empty.
    EmptyNetworkId,
    /// Session token was empty.
    EmptyToken,
    /// A field exceeded its byte limit.
    TooLong { max: usize },
    /// A field contained a control character (including newlines).
    ControlCharacter,
    /// Raw bytes were not valid UTF-8.
    InvalidUtf8,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNetworkId => write!(f, "network id is empty"),
            Self::EmptyToken => write!(f, "session token is empty"),
            Self::TooLong { max } => write!(f, "value longer than {} bytes", max),
            Self::ControlCharacter => write!(f, "value contains control characters"),
            Self::InvalidUtf8 => write!(f, "value is not valid UTF-8"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Validation helpers
// ───────────────────────────────────────────────────────────────

fn check_text(value: &str, max: usize) -> Result<(), CredentialError> {
    if value.len() > max {
        return Err(CredentialError::TooLong { max });
    }
    if value.chars().any(char::is_control) {
        return Err(CredentialError::ControlCharacter);
    }
    Ok(())
}

fn bounded<const N: usize>(value: &str) -> Result<String<N>, CredentialError> {
    let mut out = String::new();
    out.push_str(value)
        .map_err(|_| CredentialError::TooLong { max: N })?;
    Ok(out)
}

/// Decode raw bytes written by a peer into text, enforcing `max` first so
/// oversized writes are never scanned.
pub fn text_from_bytes(raw: &[u8], max: usize) -> Result<&str, CredentialError> {
    if raw.len() > max {
        return Err(CredentialError::TooLong { max });
    }
    core::str::from_utf8(raw).map_err(|_| CredentialError::InvalidUtf8)
}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// A complete `{network_id, network_secret}` pair.
///
/// Only constructible through validation, so a value of this type is always
/// safe to persist and to hand to the WiFi driver.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    network_id: String<NETWORK_ID_MAX>,
    network_secret: String<NETWORK_SECRET_MAX>,
}

impl Credentials {
    /// An empty secret means an open network.
    pub fn new(network_id: &str, network_secret: &str) -> Result<Self, CredentialError> {
        validate_network_id(network_id)?;
        validate_network_secret(network_secret)?;
        Ok(Self {
            network_id: bounded(network_id)?,
            network_secret: bounded(network_secret)?,
        })
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    pub fn network_secret(&self) -> &str {
        &self.network_secret
    }

    pub fn is_open_network(&self) -> bool {
        self.network_secret.is_empty()
    }

    /// Render the persisted record.
    pub fn encode(&self) -> String<RECORD_MAX> {
        let mut out = String::new();
        // Field limits guarantee the record fits.
        let _ = out.push_str(&self.network_id);
        let _ = out.push('\n');
        let _ = out.push_str(&self.network_secret);
        let _ = out.push('\n');
        out
    }

    /// Parse a persisted record.  Returns `None` for anything that is not a
    /// complete, valid pair.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let text = core::str::from_utf8(raw).ok()?;
        let mut lines = text.lines();
        let network_id = lines.next()?;
        let network_secret = lines.next()?;
        Self::new(network_id, network_secret).ok()
    }
}

// The secret must never reach a log line.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("network_id", &self.network_id)
            .field("network_secret", &"<redacted>")
            .finish()
    }
}

pub fn validate_network_id(value: &str) -> Result<(), CredentialError> {
    if value.is_empty() {
        return Err(CredentialError::EmptyNetworkId);
    }
    check_text(value, NETWORK_ID_MAX)
}

pub fn validate_network_secret(value: &str) -> Result<(), CredentialError> {
    check_text(value, NETWORK_SECRET_MAX)
}

// ───────────────────────────────────────────────────────────────
// Session token
// ───────────────────────────────────────────────────────────────

/// Opaque bearer token for the upstream server.  Held in RAM only.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String<SESSION_TOKEN_MAX>);

impl SessionToken {
    pub fn new(value: &str) -> Result<Self, CredentialError> {
        if value.is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        check_text(value, SESSION_TOKEN_MAX)?;
        Ok(Self(bounded(value)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} bytes>)", self.0.len())
    }
}

// ───────────────────────────────────────────────────────────────
// Credential store
// ───────────────────────────────────────────────────────────────

/// Durable home of the device's single credential record.
pub struct CredentialStore<S: StoragePort> {
    storage: S,
}

impl<S: StoragePort> CredentialStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Read the stored pair.  Missing, truncated or unreadable records all
    /// yield `None`.
    pub fn load(&self) -> Option<Credentials> {
        // One spare byte detects records longer than any valid encoding.
        let mut buf = [0u8; RECORD_MAX + 1];
        let len = match self
            .storage
            .read(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY, &mut buf)
        {
            Ok(len) => len,
            Err(StorageError::NotFound) => return None,
            Err(e) => {
                warn!("Credentials: read failed ({}), treating as absent", e);
                return None;
            }
        };
        if len > RECORD_MAX {
            warn!("Credentials: stored record oversized, ignoring");
            return None;
        }
        let creds = Credentials::decode(&buf[..len]);
        if creds.is_none() {
            warn!("Credentials: stored record malformed, ignoring");
        }
        creds
    }

    /// Replace the stored record.
    pub fn save(&mut self, credentials: &Credentials) -> Result<(), StorageError> {
        let record = credentials.encode();
        self.storage
            .write(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY, record.as_bytes())?;
        info!(
            "Credentials: stored for network '{}'",
            credentials.network_id()
        );
        Ok(())
    }

    /// Remove the stored record.  Succeeds when nothing is stored.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.storage.delete(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY)?;
        info!("Credentials: cleared");
        Ok(())
    }

    pub fn is_present(&self) -> bool {
        self.storage.exists(CREDENTIAL_NAMESPACE, CREDENTIAL_KEY)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
