//! GPIO pin assignments for the PlantBot controller board.
//!
//! Single source of truth; drivers reference this module rather than
//! hard-coding pin numbers.

/// Manual reset button: the devkit BOOT switch, active LOW with pull-up.
pub const RESET_BUTTON_GPIO: i32 = 0;
