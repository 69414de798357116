//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements         | Connects to                  |
//! |--------------|--------------------|------------------------------|
//! | `ble`        | ProvisioningPort   | Bluedroid GATT server        |
//! | `file_store` | StoragePort        | Files under a root directory |
//! | `log_sink`   | EventSink          | Serial log output            |
//! | `nvs`        | ConfigPort         | NVS / in-memory store        |
//! |              | StoragePort        |                              |
//! | `time`       | ClockPort          | ESP32 system timer           |
//! | `websocket`  | UpstreamTransport  | ESP-IDF websocket client     |
//! | `wifi`       | StationPort        | ESP-IDF WiFi STA             |

pub mod ble;
pub mod file_store;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod websocket;
pub mod wifi;
