//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Booted { credentials_wiped } => {
                info!("BOOT | credentials_wiped={}", credentials_wiped);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::ManualReset => {
                warn!("RESET | button pressed, credentials cleared");
            }
            AppEvent::PeerConnected => {
                info!("PROV | peer connected");
            }
            AppEvent::CredentialsCaptured => {
                info!("PROV | credentials captured and stored");
            }
            AppEvent::ProvisioningAbandoned => {
                warn!("PROV | peer left before all fields were written");
            }
            AppEvent::StatusNotified(status) => {
                info!("PROV | notified {}", status);
            }
            AppEvent::StatusNotDelivered(status) => {
                warn!("PROV | notification {} not delivered", status);
            }
            AppEvent::AttachFailed { attempts } => {
                warn!("LINK | attach failed after {} polls", attempts);
            }
            AppEvent::SessionOpened => {
                info!("SESSION | opened");
            }
            AppEvent::SessionClosed { messages } => {
                warn!("SESSION | closed after {} messages", messages);
            }
            AppEvent::MessageReceived(text) => {
                info!("SESSION | rx {}", text);
            }
        }
    }
}
