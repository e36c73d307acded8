//! Simulated I/O board.
//!
//! Implements [`SensorPort`] and [`RelayPort`] for the host simulation.
//! Sensor values are set by the caller; written coils and the buzzer are
//! recorded so the simulation can print them.

use log::debug;

use crate::app::ports::{RelayPort, SensorPort};
use crate::config::MAX_SENSORS;
use crate::gas::SensorSample;
use crate::relay_set::RelaySet;

pub struct HardwareAdapter {
    samples: Vec<Option<SensorSample>>,
    coils: RelaySet,
    buzzer: bool,
}

impl Default for HardwareAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareAdapter {
    /// Board with every sensor reading zero.
    pub fn new() -> Self {
        Self {
            samples: vec![Some(SensorSample::new(0)); MAX_SENSORS],
            coils: RelaySet::EMPTY,
            buzzer: false,
        }
    }

    pub fn set_value(&mut self, sensor: usize, value: i16) {
        if let Some(slot) = self.samples.get_mut(sensor) {
            *slot = Some(SensorSample::new(value));
        }
    }

    pub fn set_sample(&mut self, sensor: usize, sample: Option<SensorSample>) {
        if let Some(slot) = self.samples.get_mut(sensor) {
            *slot = sample;
        }
    }

    pub fn coils(&self) -> &RelaySet {
        &self.coils
    }

    pub fn buzzer(&self) -> bool {
        self.buzzer
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    fn read(&mut self, index: usize) -> Option<SensorSample> {
        self.samples.get(index).copied().flatten()
    }
}

// ── RelayPort implementation ──────────────────────────────────

impl RelayPort for HardwareAdapter {
    fn write_coils(&mut self, coils: &RelaySet) {
        if *coils != self.coils {
            debug!("coils: {:?}", coils);
        }
        self.coils = *coils;
    }

    fn set_buzzer(&mut self, on: bool) {
        self.buzzer = on;
    }
}
