//! Device configuration parameters
//!
//! All tunable parameters for the PlantBot connection lifecycle.
//! Values can be overridden via NVS (see [`NvsAdapter`](crate::adapters::nvs::NvsAdapter)).

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Maximum length of the advertised BLE device name.
pub const DEVICE_NAME_MAX: usize = 24;
/// Maximum length of the upstream websocket endpoint URL.
pub const ENDPOINT_MAX: usize = 128;

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Identity ---
    /// Name advertised by the provisioning channel
    pub device_name: String<DEVICE_NAME_MAX>,
    /// Upstream control server (`ws://` or `wss://`)
    pub server_endpoint: String<ENDPOINT_MAX>,

    // --- Lifecycle timing ---
    /// Idle sleep at the top of every orchestrator cycle (milliseconds)
    pub cycle_interval_ms: u32,
    /// Delay between link-state polls during attach (milliseconds)
    pub attach_poll_interval_ms: u32,
    /// Number of link-state polls before attach is declared failed
    pub attach_max_attempts: u8,
    /// Sleep after a failed re-attach with stored credentials (seconds)
    pub reattach_cooldown_secs: u32,
    /// Pause after every received upstream message (milliseconds)
    pub receive_throttle_ms: u32,

    // --- Policy ---
    /// Delete stored credentials on every boot
    pub wipe_credentials_on_boot: bool,
    /// Reopen the upstream session after a re-attach using the last
    /// provisioned token (held in RAM only)
    pub reauthenticate_on_reattach: bool,
    /// Also latch reset presses from a GPIO edge interrupt, so a tap
    /// shorter than one cycle is not missed.  Off: level polling only.
    pub reset_edge_latch: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut device_name = String::new();
        let _ = device_name.push_str("PlantBot");
        let mut server_endpoint = String::new();
        let _ = server_endpoint.push_str("ws://192.168.1.152/");

        Self {
            device_name,
            server_endpoint,

            // Timing
            cycle_interval_ms: 1000,
            attach_poll_interval_ms: 1000,
            attach_max_attempts: 10, // ~10 s budget
            reattach_cooldown_secs: 60,
            receive_throttle_ms: 1000,

            // Policy
            wipe_credentials_on_boot: true,
            reauthenticate_on_reattach: false,
            reset_edge_latch: false,
        }
    }
}

impl DeviceConfig {
    /// Range-check every field.
    ///
    /// Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() || self.device_name.chars().any(char::is_control) {
            return Err(ConfigError::ValidationFailed(
                "device_name must be non-empty printable text",
            ));
        }
        if !(self.server_endpoint.starts_with("ws://") || self.server_endpoint.starts_with("wss://"))
        {
            return Err(ConfigError::ValidationFailed(
                "server_endpoint must start with ws:// or wss://",
            ));
        }
        if !(100..=60_000).contains(&self.cycle_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "cycle_interval_ms must be 100–60000",
            ));
        }
        if !(100..=10_000).contains(&self.attach_poll_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "attach_poll_interval_ms must be 100–10000",
            ));
        }
        if !(1..=60).contains(&self.attach_max_attempts) {
            return Err(ConfigError::ValidationFailed(
                "attach_max_attempts must be 1–60",
            ));
        }
        if !(1..=3600).contains(&self.reattach_cooldown_secs) {
            return Err(ConfigError::ValidationFailed(
                "reattach_cooldown_secs must be 1–3600",
            ));
        }
        if self.receive_throttle_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "receive_throttle_ms must be 0–60000",
            ));
        }
        Ok(())
    }
}
