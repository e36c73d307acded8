//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) and the configuration
//! store emit these through the [`EventSink`](super::ports::EventSink)
//! port.  Adapters on the other side decide what to do with them: log to
//! the serial console, update the display, forward over the bus.

use crate::config::user::UserSettings;
use crate::envelope::IntegrityError;
use crate::error::ConfigError;
use crate::gas::{AlarmLevel, AlarmState, FaultFlags, OperatingState, RangeState};
use crate::store::LoadOrigin;
use crate::app::ports::StorageError;

/// Structured events emitted by the controller core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The service has booted.
    Started {
        origin: LoadOrigin,
        sensors: usize,
        relays: usize,
    },

    // ── Configuration diagnostics ─────────────────────────────
    /// Stored image was damaged; defaults are live.
    ConfigurationCorrupt(IntegrityError),
    /// Stored image has another layout version.
    VersionMismatch { found: u32, supported: u32 },
    /// An older image was converted to the current layout.
    ConfigurationMigrated { from: u32 },
    /// A staged configuration was written and verified.
    ConfigurationCommitted { crc: u32 },
    /// A staged configuration was rejected; the old one stays live.
    ConfigurationWriteFailed(ConfigError),
    /// User settings could not be persisted.
    UserSettingsSaveFailed(StorageError),
    /// User settings were persisted.
    UserSettingsSaved(UserSettings),

    // ── Sensors ───────────────────────────────────────────────
    StartupComplete,
    SensorStateChanged {
        sensor: usize,
        from: OperatingState,
        to: OperatingState,
    },
    AlarmChanged {
        sensor: usize,
        level: AlarmLevel,
        from: AlarmState,
        to: AlarmState,
    },
    /// Fault mask or range state of a sensor changed.
    FaultCauseChanged {
        sensor: usize,
        faults: FaultFlags,
        range: RangeState,
    },

    // ── Relays ────────────────────────────────────────────────
    RelayChanged { relay: usize, on: bool },
    MaxOnTimedOut { relay: usize },
}
