//! WiFi station-mode adapter.
//!
//! Implements [`StationPort`], the hexagonal boundary for network
//! attachment.  The retry budget lives in
//! [`NetworkLink`](crate::app::link::NetworkLink); this adapter only issues
//! the connect request and reports link state.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.

use log::{info, warn};

use crate::app::credentials::Credentials;
use crate::app::ports::{LinkError, StationPort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Connecting,
    Connected,
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    /// Simulation: whether the configured network answers connect requests.
    #[cfg(not(target_os = "espidf"))]
    sim_reachable: bool,
    /// Simulation: counts connect requests.
    #[cfg(not(target_os = "espidf"))]
    sim_connect_requests: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self {
            state: WifiState::Idle,
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Idle,
            sim_reachable: false,
            sim_connect_requests: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_reachable(&mut self, reachable: bool) {
        self.sim_reachable = reachable;
    }

    /// Simulation: the access point vanished.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_drop_link(&mut self) {
        self.sim_reachable = false;
        self.state = WifiState::Idle;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_connect_requests(&self) -> u32 {
        self.sim_connect_requests
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, credentials: &Credentials) -> Result<(), LinkError> {
        let auth_method = if credentials.is_open_network() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .network_id()
                .try_into()
                .map_err(|_| LinkError::Driver("network id does not fit driver config"))?,
            password: credentials
                .network_secret()
                .try_into()
                .map_err(|_| LinkError::Driver("secret does not fit driver config"))?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config).map_err(|e| {
            warn!("WiFi(espidf): set_configuration failed ({})", e);
            LinkError::Driver("set_configuration")
        })?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|e| {
                warn!("WiFi(espidf): start failed ({})", e);
                LinkError::Driver("start")
            })?;
        }
        // Non-blocking: completion is observed through is_up().
        self.wifi.connect().map_err(|e| {
            warn!("WiFi(espidf): connect request failed ({})", e);
            LinkError::Driver("connect")
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, credentials: &Credentials) -> Result<(), LinkError> {
        self.sim_connect_requests = self.sim_connect_requests.wrapping_add(1);
        info!(
            "WiFi(sim): connect request for '{}' (reachable={})",
            credentials.network_id(),
            self.sim_reachable
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi(espidf): disconnect failed ({})", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim_reachable && self.state != WifiState::Idle
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// StationPort
// ───────────────────────────────────────────────────────────────

impl StationPort for WifiAdapter {
    fn begin_connect(&mut self, credentials: &Credentials) -> Result<(), LinkError> {
        if self.state != WifiState::Idle {
            self.platform_disconnect();
        }
        info!("WiFi: connecting to '{}'", credentials.network_id());
        self.platform_connect(credentials)?;
        self.state = WifiState::Connecting;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn disconnect(&mut self) {
        if self.state == WifiState::Idle {
            return;
        }
        self.platform_disconnect();
        self.state = WifiState::Idle;
        info!("WiFi: disconnected");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
