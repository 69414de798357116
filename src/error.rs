//! Unified error type for the PlantBot firmware.
//!
//! Each port has its own typed error (see [`crate::app::ports`]); this enum
//! lets orchestrator helpers propagate any of them with `?` and keeps the
//! top-level cycle's error handling uniform.  All variants are `Copy`.

use core::fmt;

use crate::app::credentials::CredentialError;
use crate::app::ports::{
    ConfigError, LinkError, ProvisioningError, StorageError, TransportError,
};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible lifecycle operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Credential or config persistence failed.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Network attach failed.
    Link(LinkError),
    /// Upstream connection failed.
    Transport(TransportError),
    /// Provisioning channel failed or the peer left early.
    Provisioning(ProvisioningError),
    /// A credential value failed validation.
    Credential(CredentialError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Provisioning(e) => write!(f, "provisioning: {e}"),
            Self::Credential(e) => write!(f, "credential: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ProvisioningError> for Error {
    fn from(e: ProvisioningError) -> Self {
        Self::Provisioning(e)
    }
}

impl From<CredentialError> for Error {
    fn from(e: CredentialError) -> Self {
        Self::Credential(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
