//! Gas detection controller core.
//!
//! Configuration store with an integrity envelope, per-sensor alarm
//! evaluation and the relay output pipeline of a 128-channel gas
//! detection and relay controller.  Everything runs on the host; the
//! outside world is reached through the port traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gas;
pub mod relay;
pub mod relay_set;
pub mod store;

pub use error::{Error, Result};
