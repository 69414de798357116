//! PlantBot Firmware: Main Entry Point
//!
//! Hexagonal architecture driven by a single cooperative task.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter      WifiAdapter     BleAdapter     WsTransport    │
//! │  (Config+Store)  (Station)       (Provisioning) (Upstream)     │
//! │  Esp32Time       ButtonDriver    LogEventSink                  │
//! │  (Clock)         (Reset)         (EventSink)                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │          DeviceOrchestrator (pure logic)               │    │
//! │  │  CredentialStore · NetworkLink · ProvisioningChannel   │    │
//! │  │  UpstreamSession                                       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  edge-executor LocalExecutor driven by futures-lite block_on   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_hal::gpio::{PinDriver, Pull};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{info, warn};

use plantbot::adapters::ble::BleAdapter;
use plantbot::adapters::log_sink::LogEventSink;
use plantbot::adapters::nvs::NvsAdapter;
use plantbot::adapters::time::Esp32TimeAdapter;
use plantbot::adapters::websocket::WsTransport;
use plantbot::adapters::wifi::WifiAdapter;
use plantbot::app::orchestrator::DeviceOrchestrator;
use plantbot::app::ports::ConfigPort;
use plantbot::config::DeviceConfig;
use plantbot::drivers::button::{ButtonDriver, RESET_BUTTON_LATCH, install_reset_isr};
use plantbot::pins;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PlantBot v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            DeviceConfig::default()
        }
    };

    // ── 3. Construct adapters ─────────────────────────────────
    let wifi = WifiAdapter::new(EspWifi::new(
        peripherals.modem,
        sys_loop.clone(),
        Some(nvs_partition),
    )?);
    let ble = BleAdapter::new();
    let transport = WsTransport::new();

    let mut reset_pin = PinDriver::input(peripherals.pins.gpio0)?;
    reset_pin.set_pull(Pull::Up)?;
    if config.reset_edge_latch {
        if let Err(e) = install_reset_isr(pins::RESET_BUTTON_GPIO) {
            // Level polling still sees a held button.
            warn!("Reset ISR install failed ({}), polling only", e);
        }
    } else {
        info!("Reset button: level polling only");
    }
    let button = ButtonDriver::new(reset_pin, &RESET_BUTTON_LATCH);

    let mut clock = Esp32TimeAdapter::new();
    let mut sink = LogEventSink::new();

    // ── 4. Orchestrator ───────────────────────────────────────
    let orchestrator = DeviceOrchestrator::new(config, nvs, wifi, ble, transport, button);

    info!("System ready. Entering lifecycle loop.");

    // ── 5. Cooperative executor ───────────────────────────────
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    let lifecycle = executor.spawn(async move { orchestrator.run(&mut clock, &mut sink).await });

    // block_on drives the async-io-mini timers while the executor
    // drives the lifecycle task.
    match futures_lite::future::block_on(executor.run(lifecycle)) {}
}
