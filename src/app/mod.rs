//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for the PlantBot connection
//! lifecycle: credential persistence, bounded network attach, BLE
//! provisioning capture, the upstream session, and the orchestrator that
//! ties them together.  All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod credentials;
pub mod events;
pub mod link;
pub mod orchestrator;
pub mod ports;
pub mod provisioning;
pub mod session;
