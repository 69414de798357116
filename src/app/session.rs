//! Upstream session: authenticated, long-lived connection to the control
//! server.
//!
//! Opening a session connects and immediately sends the authenticate
//! message.  [`UpstreamSession::listen`] then owns the rest of the
//! session's life: it returns only once the transport reports an
//! unrecoverable close.  When the transport reconnects underneath it, the
//! authenticate message is sent again on the new connection.

use core::time::Duration;

use log::{info, warn};
use serde::Serialize;

use super::credentials::SessionToken;
use super::ports::{ClockPort, TransportError, UpstreamTransport};

/// Wire shape of every device → server control message.
#[derive(Debug, Serialize)]
pub struct ControlMessage<'a> {
    pub action: &'a str,
    pub payload: &'a str,
}

impl<'a> ControlMessage<'a> {
    pub fn authenticate(token: &'a SessionToken) -> Self {
        Self {
            action: "authenticate",
            payload: token.as_str(),
        }
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|_| TransportError::SendFailed)
    }
}

/// Why a receive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    /// Messages delivered to the callback.
    pub messages: u32,
    /// Transient receive errors absorbed along the way.
    pub receive_errors: u32,
    /// Times the transport reconnected and authenticate was re-sent.
    pub reconnects: u32,
}

/// An open, authenticated connection.  At most one exists at a time
/// because it borrows the transport exclusively.
pub struct UpstreamSession<'t, T: UpstreamTransport> {
    transport: &'t mut T,
    auth: String,
    throttle: Duration,
}

impl<'t, T: UpstreamTransport> UpstreamSession<'t, T> {
    /// Connect and authenticate.
    ///
    /// A failed authenticate send is logged and the session is still
    /// returned; the server decides what an unauthenticated client gets.
    pub async fn open(
        transport: &'t mut T,
        endpoint: &str,
        token: &SessionToken,
        throttle: Duration,
    ) -> Result<Self, TransportError> {
        info!("Session: connecting to {}", endpoint);
        transport.connect(endpoint).await?;

        let auth = ControlMessage::authenticate(token).to_json()?;
        let mut session = Self {
            transport,
            auth,
            throttle,
        };
        session.authenticate().await;
        Ok(session)
    }

    async fn authenticate(&mut self) {
        match self.transport.send_text(&self.auth).await {
            Ok(()) => info!("Session: authenticate sent"),
            Err(e) => warn!("Session: authenticate failed ({}), listening anyway", e),
        }
    }

    /// Receive loop.  Every message, and every transient error, is
    /// followed by one throttle sleep.
    pub async fn listen<C, F>(mut self, clock: &mut C, mut on_message: F) -> SessionEnd
    where
        C: ClockPort,
        F: FnMut(&str),
    {
        let mut end = SessionEnd {
            messages: 0,
            receive_errors: 0,
            reconnects: 0,
        };
        loop {
            match self.transport.recv().await {
                Ok(text) => {
                    end.messages = end.messages.saturating_add(1);
                    on_message(&text);
                }
                Err(TransportError::Closed) => {
                    warn!(
                        "Session: connection closed ({} messages, {} receive errors)",
                        end.messages, end.receive_errors
                    );
                    self.transport.close();
                    return end;
                }
                Err(TransportError::Reconnected) => {
                    end.reconnects = end.reconnects.saturating_add(1);
                    info!("Session: transport reconnected, re-authenticating");
                    self.authenticate().await;
                }
                Err(e) => {
                    end.receive_errors = end.receive_errors.saturating_add(1);
                    warn!("Session: receive error ({})", e);
                }
            }
            clock.sleep(self.throttle).await;
        }
    }
}
