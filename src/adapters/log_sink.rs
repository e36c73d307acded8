//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade, one line per event.  Slot numbers are printed
//! 1-based, the way they are labelled on the terminal blocks.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::gas::AlarmState;
use crate::store::LoadOrigin;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { origin, sensors, relays } => {
                let origin = match origin {
                    LoadOrigin::Flash => "flash".to_string(),
                    LoadOrigin::Migrated { from } => format!("migrated from v{from}"),
                    LoadOrigin::Defaults { reason } => format!("defaults ({reason})"),
                };
                info!("START | sensors={} relays={} | config={}", sensors, relays, origin);
            }
            AppEvent::ConfigurationCorrupt(e) => {
                error!("CONFIG | corrupt image: {e}");
            }
            AppEvent::VersionMismatch { found, supported } => {
                warn!("CONFIG | version {} stored, {} supported", found, supported);
            }
            AppEvent::ConfigurationMigrated { from } => {
                info!("CONFIG | migrated from v{}", from);
            }
            AppEvent::ConfigurationCommitted { crc } => {
                info!("CONFIG | committed crc=0x{:08X}", crc);
            }
            AppEvent::ConfigurationWriteFailed(e) => {
                error!("CONFIG | commit failed: {e}");
            }
            AppEvent::UserSettingsSaved(user) => {
                info!(
                    "CONFIG | user settings saved | service_interval={}d inactive={}",
                    user.service_interval_d,
                    user.inactive_sensors().count()
                );
            }
            AppEvent::UserSettingsSaveFailed(e) => {
                warn!("CONFIG | user settings not saved: {e}");
            }
            AppEvent::StartupComplete => {
                info!("SENSOR | startup complete");
            }
            AppEvent::SensorStateChanged { sensor, from, to } => {
                info!("SENSOR | {} | {} -> {}", sensor + 1, from, to);
            }
            AppEvent::AlarmChanged { sensor, level, from, to } => {
                if *to == AlarmState::On {
                    warn!("ALARM | sensor {} {} | {} -> {}", sensor + 1, level, from, to);
                } else {
                    info!("ALARM | sensor {} {} | {} -> {}", sensor + 1, level, from, to);
                }
            }
            AppEvent::FaultCauseChanged { sensor, faults, range } => match faults.primary() {
                Some(code) => warn!(
                    "SENSOR | {} | fault {} (mask=0x{:03X}) range={:?}",
                    sensor + 1,
                    code,
                    faults.bits(),
                    range
                ),
                None => info!("SENSOR | {} | faults clear range={:?}", sensor + 1, range),
            },
            AppEvent::RelayChanged { relay, on } => {
                info!("RELAY | {} | {}", relay + 1, if *on { "on" } else { "off" });
            }
            AppEvent::MaxOnTimedOut { relay } => {
                warn!("RELAY | {} | max on-time reached", relay + 1);
            }
        }
    }
}
