//! Application core: controller logic, zero I/O.
//!
//! This module wires the configuration store, gas detection and relay
//! control into one tick-driven service.  All interaction with hardware
//! happens through **port traits** defined in [`ports`], keeping this
//! layer fully testable without real peripherals.

pub mod channels;
pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
