//! Unified error types for the controller core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  All variants are `Copy`.

use core::fmt;

use crate::app::ports::{FlashError, StorageError};
use crate::envelope::IntegrityError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A loaded settings image failed an integrity check.
    Integrity(IntegrityError),
    /// A configuration change could not be committed.
    Config(ConfigError),
    /// The flash collaborator failed.
    Flash(FlashError),
    /// The key/value store failed.
    Storage(StorageError),
    /// A command addressed something that does not exist.
    Command(CommandError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrity(e) => write!(f, "integrity: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Flash(e) => write!(f, "flash: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<IntegrityError> for Error {
    fn from(e: IntegrityError) -> Self {
        Self::Integrity(e)
    }
}

impl From<FlashError> for Error {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration commit errors
// ---------------------------------------------------------------------------

/// Failure of a stage-and-commit transaction.  The previously committed
/// settings stay live in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The staged settings failed a range check.
    ValidationFailed(&'static str),
    /// The flash collaborator rejected the write.
    WriteFailed(FlashError),
    /// Read-back after the write did not match the sealed image.
    VerifyFailed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::WriteFailed(e) => write!(f, "configuration write failed: {e}"),
            Self::VerifyFailed => write!(f, "read-back verification failed"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Sensor slot index outside the configured sensor count.
    NoSuchSensor(usize),
    /// Relay slot index outside the configured relay count.
    NoSuchRelay(usize),
    /// Relay timer index outside 0..4.
    NoSuchTimer(usize),
    /// Alarm level outside 0..4.
    NoSuchLevel(usize),
    /// Sensor slot exists but is configured inactive.
    SensorInactive(usize),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchSensor(i) => write!(f, "no sensor {i}"),
            Self::NoSuchRelay(i) => write!(f, "no relay {i}"),
            Self::NoSuchTimer(i) => write!(f, "no relay timer {i}"),
            Self::NoSuchLevel(i) => write!(f, "no alarm level {i}"),
            Self::SensorInactive(i) => write!(f, "sensor {i} is inactive"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
