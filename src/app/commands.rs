//! Inbound commands to the application service.
//!
//! These represent actions requested by the front panel or the
//! configuration tool that the [`AppService`](super::service::AppService)
//! interprets and acts upon.

use crate::config::{
    ALARM_LEVELS, MAX_RELAYS, MAX_SENSORS, RELAY_TIMERS, RelayProperties, RelayTimer, Settings,
};
use crate::error::CommandError;
use crate::gas::InhibitKind;
use crate::relay::TestCoil;
use crate::relay_set::RelaySet;

/// Commands that external adapters can send into the controller core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Take a sensor out of service.
    Inhibit { sensor: usize, kind: InhibitKind },
    /// Put an inhibited sensor back into service.
    ReleaseInhibit { sensor: usize },
    /// Acknowledge the manual-reset latch of one relay.
    AcknowledgeRelay { relay: usize },
    AcknowledgeAll,
    /// Re-enable a relay that hit its max on-time.
    ClearMaxOnTimeout { relay: usize },
    /// Commissioning override of a relay coil.
    SetTestCoil { relay: usize, mode: TestCoil },
    /// Change the service interval kept in user settings.
    SetServiceInterval { days: u16 },
    /// Change the sealed configuration.
    Configure(ConfigEdit),
}

/// A change to the sealed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEdit {
    AlarmLevels {
        sensor: usize,
        level: usize,
        on_level: i16,
        off_level: i16,
    },
    AlarmDelays {
        sensor: usize,
        level: usize,
        on_delay: u16,
        off_delay: u16,
    },
    AlarmRelays {
        sensor: usize,
        level: usize,
        relays: RelaySet,
    },
    SensorActive { sensor: usize, active: bool },
    AverageTime { sensor: usize, minutes: u8 },
    Relay {
        relay: usize,
        properties: RelayProperties,
    },
    RelayTimer { index: usize, timer: RelayTimer },
    StartupTime { seconds: u16 },
    /// Whole configuration uploaded by the configuration tool.
    Replace(Box<Settings>),
}

/// Runtime state affected by an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Sensor(usize),
    Relay(usize),
    /// Startup delay; a running countdown is shortened to the new value.
    Startup,
    /// Only read at boot or per tick; no runtime state to reset.
    Global,
    All,
}

impl ConfigEdit {
    /// Reject indices that address no slot.
    pub fn check(&self) -> Result<(), CommandError> {
        let sensor_level = |sensor: usize, level: usize| {
            if sensor >= MAX_SENSORS {
                Err(CommandError::NoSuchSensor(sensor))
            } else if level >= ALARM_LEVELS {
                Err(CommandError::NoSuchLevel(level))
            } else {
                Ok(())
            }
        };
        match self {
            Self::AlarmLevels { sensor, level, .. }
            | Self::AlarmDelays { sensor, level, .. }
            | Self::AlarmRelays { sensor, level, .. } => sensor_level(*sensor, *level),
            Self::SensorActive { sensor, .. } | Self::AverageTime { sensor, .. } => {
                sensor_level(*sensor, 0)
            }
            Self::Relay { relay, .. } if *relay >= MAX_RELAYS => Err(CommandError::NoSuchRelay(*relay)),
            Self::RelayTimer { index, .. } if *index >= RELAY_TIMERS => {
                Err(CommandError::NoSuchTimer(*index))
            }
            _ => Ok(()),
        }
    }

    pub fn target(&self) -> EditTarget {
        match self {
            Self::AlarmLevels { sensor, .. }
            | Self::AlarmDelays { sensor, .. }
            | Self::AlarmRelays { sensor, .. }
            | Self::SensorActive { sensor, .. }
            | Self::AverageTime { sensor, .. } => EditTarget::Sensor(*sensor),
            Self::Relay { relay, .. } => EditTarget::Relay(*relay),
            Self::RelayTimer { .. } => EditTarget::Global,
            Self::StartupTime { .. } => EditTarget::Startup,
            Self::Replace(_) => EditTarget::All,
        }
    }

    /// Write the edit into `s`.  Out-of-range indices are ignored; run
    /// [`check`](Self::check) first to report them.
    pub fn apply(self, s: &mut Settings) {
        match self {
            Self::AlarmLevels {
                sensor,
                level,
                on_level,
                off_level,
            } => {
                if let Some(a) = alarm_mut(s, sensor, level) {
                    a.on_level = on_level;
                    a.off_level = off_level;
                }
            }
            Self::AlarmDelays {
                sensor,
                level,
                on_delay,
                off_delay,
            } => {
                if let Some(a) = alarm_mut(s, sensor, level) {
                    a.on_delay = on_delay;
                    a.off_delay = off_delay;
                }
            }
            Self::AlarmRelays { sensor, level, relays } => {
                if let Some(a) = alarm_mut(s, sensor, level) {
                    a.relays = relays;
                }
            }
            Self::SensorActive { sensor, active } => {
                if let Some(p) = s.sensors.get_mut(sensor) {
                    p.active = active;
                }
            }
            Self::AverageTime { sensor, minutes } => {
                if let Some(p) = s.sensors.get_mut(sensor) {
                    p.value_average_time_m = minutes;
                }
            }
            Self::Relay { relay, properties } => {
                if let Some(r) = s.relays.get_mut(relay) {
                    *r = properties;
                }
            }
            Self::RelayTimer { index, timer } => {
                if let Some(t) = s.relay_timers.get_mut(index) {
                    *t = timer;
                }
            }
            Self::StartupTime { seconds } => s.startup_time_s = seconds,
            Self::Replace(settings) => *s = *settings,
        }
    }
}

fn alarm_mut(
    s: &mut Settings,
    sensor: usize,
    level: usize,
) -> Option<&mut crate::config::AlarmProperties> {
    s.sensors.get_mut(sensor)?.alarms.get_mut(level)
}
