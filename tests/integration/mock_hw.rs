//! Mock hardware adapter for integration tests.
//!
//! Implements every port the service talks to.  Sensor samples are set
//! by the test; every coil write is recorded so tests can assert on the
//! full output history.

use gasctl::adapters::flash::MemoryFlash;
use gasctl::adapters::nvs::NvsAdapter;
use gasctl::app::events::AppEvent;
use gasctl::app::ports::{
    ClockPort, EventSink, FlashError, FlashPort, RelayPort, SensorPort, StorageError, StoragePort,
};
use gasctl::config::{MAX_SENSORS, Settings};
use gasctl::envelope;
use gasctl::gas::{AlarmLevel, AlarmState, SensorSample};
use gasctl::relay_set::RelaySet;

// ── MockHw ────────────────────────────────────────────────────

pub struct MockHw {
    pub samples: Vec<Option<SensorSample>>,
    pub coil_writes: Vec<RelaySet>,
    pub buzzer: bool,
    pub minute: Option<u16>,
    pub flash: MemoryFlash,
    pub nvs: NvsAdapter,
}

#[allow(dead_code)]
impl MockHw {
    /// Blank flash, empty key/value store, every sensor reading zero.
    pub fn new() -> Self {
        Self {
            samples: vec![Some(SensorSample::new(0)); MAX_SENSORS],
            coil_writes: Vec::new(),
            buzzer: false,
            minute: None,
            flash: MemoryFlash::new(),
            nvs: NvsAdapter::with_capacity(8),
        }
    }

    /// Flash preloaded with a sealed copy of `settings`.
    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            flash: MemoryFlash::with_image(envelope::seal(settings).as_bytes()),
            ..Self::new()
        }
    }

    pub fn set_value(&mut self, sensor: usize, value: i16) {
        self.samples[sensor] = Some(SensorSample::new(value));
    }

    pub fn unplug(&mut self, sensor: usize) {
        self.samples[sensor] = None;
    }

    /// Coils written on the last tick.
    pub fn coils(&self) -> RelaySet {
        self.coil_writes.last().copied().unwrap_or_default()
    }

    pub fn coil(&self, relay: usize) -> bool {
        self.coils().contains(relay)
    }
}

impl Default for MockHw {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockHw {
    fn read(&mut self, index: usize) -> Option<SensorSample> {
        self.samples.get(index).copied().flatten()
    }
}

impl RelayPort for MockHw {
    fn write_coils(&mut self, coils: &RelaySet) {
        self.coil_writes.push(*coils);
    }

    fn set_buzzer(&mut self, on: bool) {
        self.buzzer = on;
    }
}

impl ClockPort for MockHw {
    fn minute_of_day(&self) -> Option<u16> {
        self.minute
    }
}

impl FlashPort for MockHw {
    fn read_image(&mut self) -> Result<Vec<u8>, FlashError> {
        self.flash.read_image()
    }

    fn write_image(&mut self, image: &[u8]) -> Result<(), FlashError> {
        self.flash.write_image(image)
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FlashError> {
        self.flash.program(offset, bytes)
    }
}

impl StoragePort for MockHw {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.nvs.read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.nvs.write(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.nvs.delete(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.nvs.exists(namespace, key)
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }

    /// Alarm transitions of one sensor level, in order.
    pub fn alarm_transitions(&self, sensor: usize, level: AlarmLevel) -> Vec<AlarmState> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::AlarmChanged {
                    sensor: s,
                    level: l,
                    to,
                    ..
                } if *s == sensor && *l == level => Some(*to),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
