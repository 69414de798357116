//! ESP32 time adapter.
//!
//! Implements [`ClockPort`] with `async-io-mini` reactor timers, so every
//! lifecycle sleep yields to the executor instead of blocking the thread.
//! Also provides monotonic uptime queries for log lines.
//!
//! - **`target_os = "espidf"`**: uptime wraps `esp_timer_get_time()` from
//!   the ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation.

use core::time::Duration;

use crate::app::ports::ClockPort;

/// Time adapter for the ESP32 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot (monotonic, truncated to u32).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u32 {
        ((unsafe { esp_idf_sys::esp_timer_get_time() }) / 1000) as u32
    }

    /// Milliseconds since boot (monotonic, truncated to u32).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u32 {
        self.uptime_ms() / 1000
    }
}

impl ClockPort for Esp32TimeAdapter {
    async fn sleep(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        async_io_mini::Timer::after(duration).await;
    }
}
