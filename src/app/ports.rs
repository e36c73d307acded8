//! Port traits: the hexagonal boundary between the controller core and
//! its collaborators.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService / ConfigStore (domain)
//! ```
//!
//! The CAN sensor bus, relay driver board, real-time clock and flash
//! programmer all live on the far side of these traits.  The domain core
//! consumes them via generics and never touches hardware directly.
//!
//! ## Contract notes
//!
//! - **FlashPort** writes are synchronous: the core only sees
//!   "succeeded" or "failed".  Erase-before-write and programming timing
//!   are the adapter's concern.
//! - **StoragePort** writes MUST be atomic per key.

use crate::app::events::AppEvent;
use crate::gas::SensorSample;
use crate::relay_set::RelaySet;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: sensor bus → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port for the sensor bus.
pub trait SensorPort {
    /// Latest sample of sensor slot `index`, or `None` when the module did
    /// not answer during this tick.
    fn read(&mut self, index: usize) -> Option<SensorSample>;
}

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → relay boards)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the relay outputs.
pub trait RelayPort {
    /// Set the physical coil of every relay: member ⇔ coil energized.
    fn write_coils(&mut self, coils: &RelaySet);

    /// Switch the alarm buzzer.
    fn set_buzzer(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: RTC → domain)
// ───────────────────────────────────────────────────────────────

/// Wall-clock time of day for the relay timers.
pub trait ClockPort {
    /// Minutes since local midnight (0–1439), or `None` while the clock
    /// has not been set.
    fn minute_of_day(&self) -> Option<u16>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / display)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Flash port (driven adapter: domain ↔ settings flash sector)
// ───────────────────────────────────────────────────────────────

/// Access to the flash region holding the sealed settings descriptor.
pub trait FlashPort {
    /// Read the whole region.
    fn read_image(&mut self) -> Result<Vec<u8>, FlashError>;

    /// Replace the whole region with `image`.
    fn write_image(&mut self, image: &[u8]) -> Result<(), FlashError>;

    /// Program `bytes` at `offset` from the start of the region without
    /// touching the rest.
    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FlashError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ key/value store)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for user settings.
///
/// Keys are namespaced to prevent collisions between subsystems.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`FlashPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Read or program beyond the end of the region.
    OutOfBounds,
    /// Programming or erase reported failure.
    WriteFailed,
    /// The region could not be read back.
    ReadFailed,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// The stored blob could not be encoded or decoded.
    Encoding,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "access out of bounds"),
            Self::WriteFailed => write!(f, "program/erase failed"),
            Self::ReadFailed => write!(f, "read failed"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Encoding => write!(f, "blob encoding error"),
        }
    }
}
