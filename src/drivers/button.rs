//! Polled reset button driver with an optional edge latch.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up.  [`ButtonDriver::reset_requested`]
//! is polled once per orchestrator cycle and reads the live pin level.
//! When `reset_edge_latch` is enabled, [`install_reset_isr`] also hooks the
//! falling edge and records its timestamp into a [`ButtonLatch`], so a
//! press that starts and ends between two polls is still seen.
//!
//! Either way a press held across several polls counts once.

use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::digital::InputPin;
use log::{info, warn};

use crate::app::ports::ResetPort;

const DEBOUNCE_MS: u32 = 50;

/// Edge timestamp shared between the GPIO ISR and the driver.
///
/// Written from interrupt context, read from the lifecycle task.
pub struct ButtonLatch {
    last_edge_ms: AtomicU32,
}

impl ButtonLatch {
    pub const fn new() -> Self {
        Self {
            last_edge_ms: AtomicU32::new(0),
        }
    }

    /// Record a falling edge.  Lock-free; safe from ISR context.
    /// A timestamp of 0 is bumped to 1 so it never reads as "no edge".
    pub fn record(&self, now_ms: u32) {
        self.last_edge_ms.store(now_ms.max(1), Ordering::Release);
    }

    fn last_edge(&self) -> u32 {
        self.last_edge_ms.load(Ordering::Acquire)
    }
}

impl Default for ButtonLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Latch fed by the board's reset-button ISR.
pub static RESET_BUTTON_LATCH: ButtonLatch = ButtonLatch::new();

pub struct ButtonDriver<P: InputPin> {
    pin: P,
    latch: &'static ButtonLatch,
    /// Last latch value consumed.
    seen_edge_ms: u32,
    /// Pin level at the previous poll.
    was_held: bool,
}

impl<P: InputPin> ButtonDriver<P> {
    pub fn new(pin: P, latch: &'static ButtonLatch) -> Self {
        // Edges recorded before the driver existed are not presses.
        let seen_edge_ms = latch.last_edge();
        Self {
            pin,
            latch,
            seen_edge_ms,
            was_held: false,
        }
    }

    fn is_held(&mut self) -> bool {
        match self.pin.is_low() {
            Ok(low) => low,
            Err(_) => {
                warn!("Button: pin read failed");
                false
            }
        }
    }

    fn take_edge(&mut self) -> bool {
        let edge_ms = self.latch.last_edge();
        if edge_ms == self.seen_edge_ms {
            return false;
        }
        let bounced =
            self.seen_edge_ms != 0 && edge_ms.wrapping_sub(self.seen_edge_ms) < DEBOUNCE_MS;
        self.seen_edge_ms = edge_ms;
        !bounced
    }
}

impl<P: InputPin> ResetPort for ButtonDriver<P> {
    fn reset_requested(&mut self) -> bool {
        let edge = self.take_edge();
        let held = self.is_held();
        let pressed = (edge && !self.was_held) || (held && !self.was_held);
        self.was_held = held;
        if pressed {
            info!("Button: reset press detected");
        }
        pressed
    }
}

// ── GPIO ISR registration ─────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn reset_gpio_isr(_arg: *mut core::ffi::c_void) {
    // SAFETY: esp_timer_get_time is a counter read; safe in ISR context.
    let now_ms = (unsafe { esp_idf_sys::esp_timer_get_time() } / 1000) as u32;
    RESET_BUTTON_LATCH.record(now_ms);
}

/// Install the GPIO ISR service (if needed) and hook the reset button's
/// falling edge to [`RESET_BUTTON_LATCH`].
#[cfg(target_os = "espidf")]
pub fn install_reset_isr(gpio: i32) -> Result<(), i32> {
    use esp_idf_sys::*;
    // SAFETY: called once from the main task before the lifecycle starts.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(ret);
        }
        let ret = gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_NEGEDGE);
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
        let ret = gpio_isr_handler_add(gpio, Some(reset_gpio_isr), core::ptr::null_mut());
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
    }
    info!("Button: reset ISR installed on GPIO{}", gpio);
    Ok(())
}
