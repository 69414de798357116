//! Websocket upstream transport.
//!
//! Implements [`UpstreamTransport`] on top of the ESP-IDF websocket client.
//! The client delivers frames from its own task through a callback; the
//! callback pushes them into a static `embassy-sync` channel and the
//! lifecycle task awaits that channel in [`recv`](UpstreamTransport::recv).
//!
//! ```text
//!   esp_websocket_client task ──▶ WS_EVENTS ──▶ WsTransport::recv().await
//! ```
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::ws::client::EspWebSocketClient`.
//! - **all other targets**: simulation; connect/send are recorded and
//!   inbound events are injected into the channel by tests.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::app::ports::{TransportError, UpstreamTransport};

#[cfg(target_os = "espidf")]
use esp_idf_svc::ws::FrameType;
#[cfg(target_os = "espidf")]
use esp_idf_svc::ws::client::{
    EspWebSocketClient, EspWebSocketClientConfig, WebSocketEvent, WebSocketEventType,
};

/// Channel depth for inbound websocket events.
const EVENT_DEPTH: usize = 8;

/// How long `connect` waits for the handshake to complete.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Events crossing from the websocket client task into the lifecycle task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Connected,
    Text(String),
    /// A frame or socket error the client recovers from by itself.
    Error,
    /// The socket dropped; the client is reconnecting on its own.
    Disconnected,
    /// The connection is gone.
    Closed,
}

pub type WsEventChannel = Channel<CriticalSectionRawMutex, WsEvent, EVENT_DEPTH>;

/// Inbound events from the ESP-IDF websocket client callback.
pub static WS_EVENTS: WsEventChannel = Channel::new();

pub struct WsTransport {
    events: &'static WsEventChannel,
    connected: bool,
    /// Set between a `Disconnected` event and the client's reconnect.
    dropped: bool,
    #[cfg(target_os = "espidf")]
    client: Option<EspWebSocketClient<'static>>,
    /// Simulation: endpoints passed to `connect`.
    #[cfg(not(target_os = "espidf"))]
    sim_connects: Vec<String>,
    /// Simulation: text frames passed to `send_text`.
    #[cfg(not(target_os = "espidf"))]
    sim_sent: Vec<String>,
    /// Simulation: reject the next connect attempts.
    #[cfg(not(target_os = "espidf"))]
    sim_refuse_connect: bool,
}

impl WsTransport {
    /// Transport fed by the global [`WS_EVENTS`] channel.
    pub fn new() -> Self {
        Self::with_channel(&WS_EVENTS)
    }

    /// Transport fed by a caller-provided channel (tests).
    pub fn with_channel(events: &'static WsEventChannel) -> Self {
        Self {
            events,
            connected: false,
            dropped: false,
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(not(target_os = "espidf"))]
            sim_connects: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_sent: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_refuse_connect: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_connects(&self) -> &[String] {
        &self.sim_connects
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_sent(&self) -> &[String] {
        &self.sim_sent
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_refuse_connect(&mut self, refuse: bool) {
        self.sim_refuse_connect = refuse;
    }

    fn drain_stale_events(&self) {
        while self.events.try_receive().is_ok() {}
    }

    async fn await_handshake(&self) -> Result<(), TransportError> {
        loop {
            match self.events.receive().await {
                WsEvent::Connected => return Ok(()),
                WsEvent::Closed => return Err(TransportError::ConnectFailed),
                WsEvent::Text(_) | WsEvent::Error | WsEvent::Disconnected => {}
            }
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_open(&mut self, endpoint: &str) -> Result<(), TransportError> {
        let events = self.events;
        let config = EspWebSocketClientConfig::default();
        let client = EspWebSocketClient::new(
            endpoint,
            &config,
            CONNECT_TIMEOUT,
            move |event: &Result<WebSocketEvent, _>| {
                let forwarded = match event {
                    Ok(event) => match event.event_type {
                        WebSocketEventType::Connected => Some(WsEvent::Connected),
                        WebSocketEventType::Text(text) => Some(WsEvent::Text(text.into())),
                        WebSocketEventType::Disconnected => Some(WsEvent::Disconnected),
                        WebSocketEventType::Close(_) | WebSocketEventType::Closed => {
                            Some(WsEvent::Closed)
                        }
                        _ => None,
                    },
                    Err(_) => Some(WsEvent::Error),
                };
                if let Some(ev) = forwarded {
                    if events.try_send(ev).is_err() {
                        log::warn!("WS: event channel full, dropping event");
                    }
                }
            },
        )
        .map_err(|e| {
            warn!("WS(espidf): client init failed ({})", e);
            TransportError::ConnectFailed
        })?;
        self.client = Some(client);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_open(&mut self, endpoint: &str) -> Result<(), TransportError> {
        self.sim_connects.push(endpoint.into());
        if self.sim_refuse_connect {
            warn!("WS(sim): connection to {} refused", endpoint);
            return Err(TransportError::ConnectFailed);
        }
        // The handshake completes immediately in simulation.
        if self.events.try_send(WsEvent::Connected).is_err() {
            return Err(TransportError::ConnectFailed);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_send(&mut self, text: &str) -> Result<(), TransportError> {
        let client = self.client.as_mut().ok_or(TransportError::SendFailed)?;
        client
            .send(FrameType::Text(false), text.as_bytes())
            .map_err(|e| {
                warn!("WS(espidf): send failed ({})", e);
                TransportError::SendFailed
            })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_send(&mut self, text: &str) -> Result<(), TransportError> {
        self.sim_sent.push(text.into());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_close(&mut self) {
        // Dropping the client stops its task and frees the socket.
        self.client = None;
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_close(&mut self) {
        info!("WS(sim): closed");
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// UpstreamTransport
// ───────────────────────────────────────────────────────────────

impl UpstreamTransport for WsTransport {
    async fn connect(&mut self, endpoint: &str) -> Result<(), TransportError> {
        self.close();
        self.drain_stale_events();
        info!("WS: connecting to {}", endpoint);
        self.platform_open(endpoint)?;

        let timeout = async {
            async_io_mini::Timer::after(CONNECT_TIMEOUT).await;
            Err(TransportError::ConnectFailed)
        };
        match futures_lite::future::or(self.await_handshake(), timeout).await {
            Ok(()) => {
                self.connected = true;
                self.dropped = false;
                info!("WS: connected");
                Ok(())
            }
            Err(e) => {
                warn!("WS: handshake with {} failed", endpoint);
                self.platform_close();
                Err(e)
            }
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::SendFailed);
        }
        self.platform_send(text)
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::Closed);
        }
        loop {
            match self.events.receive().await {
                WsEvent::Text(text) => return Ok(text),
                WsEvent::Error => return Err(TransportError::ReceiveFailed),
                WsEvent::Disconnected => {
                    warn!("WS: connection dropped, client reconnecting");
                    self.dropped = true;
                    return Err(TransportError::ReceiveFailed);
                }
                WsEvent::Connected if self.dropped => {
                    info!("WS: reconnected");
                    self.dropped = false;
                    return Err(TransportError::Reconnected);
                }
                WsEvent::Connected => {}
                WsEvent::Closed => {
                    self.connected = false;
                    return Err(TransportError::Closed);
                }
            }
        }
    }

    fn close(&mut self) {
        if self.connected {
            self.platform_close();
            self.connected = false;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
