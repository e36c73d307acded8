//! Controller configuration.
//!
//! [`Settings`] is the payload of the flash-resident settings descriptor:
//! device identity, global behaviour and three fixed-size collections
//! (sensors, relays, relay timers) indexed by slot.  The on-flash byte
//! layout lives in [`layout`]; this module only defines the typed model,
//! the compiled-in defaults and the pre-commit range checks.

pub mod layout;
pub mod text;
pub mod user;

use core::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::relay_set::RelaySet;
pub use text::FixedText;

// ---------------------------------------------------------------------------
// Hardware characteristics
// ---------------------------------------------------------------------------

/// Sensors or relays per bus segment.
pub const SEGMENT_SIZE: usize = 32;
/// Number of bus segments.
pub const SEGMENTS: usize = 4;
pub const MAX_SENSORS: usize = SEGMENTS * SEGMENT_SIZE;
pub const MAX_RELAYS: usize = SEGMENTS * SEGMENT_SIZE;
/// A/D inputs on the mainboard.
pub const MIN_ONBOARD_SENSORS: usize = 4;
/// Mainboard plus option board A/D inputs.
pub const MAX_ONBOARD_SENSORS: usize = 10;
pub const MIN_ONBOARD_RELAYS: usize = 5;
pub const MAX_ONBOARD_RELAYS: usize = 8;
pub const RELAY_TIMERS: usize = 4;
pub const ALARM_LEVELS: usize = 4;

/// Largest value an alarm/fault/inhibit timer can hold (14-bit counter).
pub const TIMER_MAX_SECS: u16 = 0x3FFF;
/// Largest relay on-time the 12-bit on-timer can measure.
pub const RELAY_ON_TIMER_MAX_SECS: u16 = 0x0FFF;
/// Longest supported averaging window.
pub const MAX_AVERAGE_TIME_M: u8 = 60;
pub const MINUTES_PER_DAY: i16 = 1440;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// How a sensor's value is compared against its alarm thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MeasurementMode {
    /// Rising value alarms.
    #[default]
    Normal = 0,
    /// Falling value alarms (oxygen depletion).
    Oxygen = 1,
    /// Value outside a band alarms.
    Window = 2,
}

impl MeasurementMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Normal),
            1 => Some(Self::Oxygen),
            2 => Some(Self::Window),
            _ => None,
        }
    }
}

/// Which derived signal an alarm or fault evaluates against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueSource {
    /// Instantaneous sensor value.
    #[default]
    Normal = 0,
    /// Moving average over `value_average_time_m`.
    Average = 1,
    /// Raw loop-current value without range adaption.
    Raw20mA = 2,
}

impl ValueSource {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Normal),
            1 => Some(Self::Average),
            2 => Some(Self::Raw20mA),
            _ => None,
        }
    }
}

/// Range conditions that raise the fault alarm (bitwise on flash).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCauses {
    pub under_range: bool,
    pub over_range: bool,
}

impl FaultCauses {
    pub const fn bits(self) -> u8 {
        (self.under_range as u8) | ((self.over_range as u8) << 1)
    }

    /// `None` when `bits` has anything outside the two defined causes.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !0b11 != 0 {
            return None;
        }
        Some(Self {
            under_range: bits & 0b01 != 0,
            over_range: bits & 0b10 != 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Sensor properties
// ---------------------------------------------------------------------------

/// One alarm level of a sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmProperties {
    pub value_source: ValueSource,
    /// Threshold that arms the alarm.
    pub on_level: i16,
    /// Threshold the value must return past to release the alarm.
    pub off_level: i16,
    /// Seconds the condition must persist before the alarm is honoured.
    pub on_delay: u16,
    /// Seconds the release must persist before the alarm drops.
    pub off_delay: u16,
    pub relays: RelaySet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorProperties {
    pub active: bool,
    pub mode: MeasurementMode,
    /// Full-scale display value, e.g. 2000 for "20.00" with two decimals.
    pub measuring_range: i16,
    /// Artificial zero point for negative or differential values.
    pub offset: i16,
    pub decimal_point: u8,
    /// Averaging window in minutes; 0 disables averaging.
    pub value_average_time_m: u8,
    pub measuring_unit: FixedText<8>,
    pub sensor_name: FixedText<16>,
    pub location_name: FixedText<24>,
    pub alarms: [AlarmProperties; ALARM_LEVELS],
    pub fault_value_source: ValueSource,
    pub fault_causes: FaultCauses,
    pub fault_on_delay: u16,
    pub fault_off_delay: u16,
    pub fault_relays: RelaySet,
}

impl SensorProperties {
    /// Factory defaults for sensor slot `index`.
    pub fn factory(index: usize) -> Self {
        let mut name = heapless::String::<16>::new();
        // "Sensor 128" always fits.
        write!(name, "Sensor {}", index + 1).ok();

        let alarm = |level: usize, on: i16, off: i16| AlarmProperties {
            value_source: ValueSource::Normal,
            on_level: on,
            off_level: off,
            on_delay: 0,
            off_delay: 0,
            relays: RelaySet::single(level + 1),
        };

        Self {
            active: index < MIN_ONBOARD_SENSORS,
            mode: MeasurementMode::Normal,
            measuring_range: 100,
            offset: 0,
            decimal_point: 0,
            value_average_time_m: 1,
            measuring_unit: FixedText::new("ppm"),
            sensor_name: FixedText::new(&name),
            location_name: FixedText::EMPTY,
            alarms: [
                alarm(0, 20, 15),
                alarm(1, 40, 35),
                alarm(2, 60, 55),
                alarm(3, 80, 75),
            ],
            fault_value_source: ValueSource::Normal,
            fault_causes: FaultCauses {
                under_range: true,
                over_range: true,
            },
            fault_on_delay: 10,
            fault_off_delay: 0,
            fault_relays: RelaySet::single(0),
        }
    }

    /// Lowest in-range value (negative when an offset is configured).
    pub fn range_low(&self) -> i16 {
        self.offset.saturating_neg()
    }

    pub fn range_high(&self) -> i16 {
        self.measuring_range
    }
}

// ---------------------------------------------------------------------------
// Relay properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProperties {
    pub active: bool,
    /// Coil polarity in the quiet state: `true` = energized (fail-safe).
    pub energized: bool,
    pub pulsating: bool,
    /// Latch until acknowledged after an alarm drove the relay.
    pub manual_reset: bool,
    /// Acknowledge the manual-reset latch automatically.
    pub immediate_reset: bool,
    /// Relay state is mirrored onto the buzzer.
    pub buzzer_on: bool,
    /// Maximum continuous on-time in seconds; 0 = unlimited.
    pub max_on_time: u16,
}

/// Time-of-day window that drives a set of relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTimer {
    /// Reserved.
    pub mode: i16,
    /// Minutes since midnight at which the relays switch on; negative disables.
    pub on_time: i16,
    /// Minutes since midnight at which the relays switch off.
    pub off_time: i16,
    pub relays: RelaySet,
}

impl RelayTimer {
    pub const DISABLED: Self = Self {
        mode: 0,
        on_time: -1,
        off_time: -1,
        relays: RelaySet::EMPTY,
    };
}

impl Default for RelayTimer {
    fn default() -> Self {
        Self::DISABLED
    }
}

// ---------------------------------------------------------------------------
// Settings payload
// ---------------------------------------------------------------------------

/// The complete persisted configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    // --- Identity ---
    /// Configuration date, `DD.MM.YYYY`.
    pub date: FixedText<12>,
    /// Device name shown at startup.
    pub name: FixedText<8>,
    pub led_matrix_type: u8,
    pub password_code: u64,
    pub serial_nr: i32,
    pub cpu_type: i16,

    // --- Display texts ---
    pub alarm_text: [FixedText<16>; ALARM_LEVELS],
    pub fault_text: FixedText<16>,
    pub inactive_text: FixedText<16>,
    pub service_text: FixedText<16>,

    // --- Global behaviour ---
    /// Informational operating temperature range (°C).
    pub temperature_range_low: i16,
    pub temperature_range_high: i16,
    /// Seconds after boot before thresholds are monitored.
    pub startup_time_s: u16,
    pub beeper_frequency: u16,
    /// Days between service visits.
    pub service_interval_d: u16,
    pub nr_of_sensors: u16,
    pub nr_of_relays: u16,
    /// `true`: special states on relay 2; `false`: on relay 1 together with fault.
    pub special_state_on_relay2: bool,

    // --- Slots ---
    #[serde(with = "fixed_array")]
    pub sensors: [SensorProperties; MAX_SENSORS],
    #[serde(with = "fixed_array")]
    pub relays: [RelayProperties; MAX_RELAYS],
    pub relay_timers: [RelayTimer; RELAY_TIMERS],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            date: FixedText::new("01.01.2024"),
            name: FixedText::new("GD-128"),
            led_matrix_type: 0,
            password_code: 0,
            serial_nr: 0,
            cpu_type: 0,

            alarm_text: [
                FixedText::new("Alarm 1"),
                FixedText::new("Alarm 2"),
                FixedText::new("Alarm 3"),
                FixedText::new("Main alarm"),
            ],
            fault_text: FixedText::new("Fault"),
            inactive_text: FixedText::new("Inactive"),
            service_text: FixedText::new("Service due"),

            temperature_range_low: -20,
            temperature_range_high: 50,
            startup_time_s: 60,
            beeper_frequency: 2000,
            service_interval_d: 365,
            nr_of_sensors: MIN_ONBOARD_SENSORS as u16,
            nr_of_relays: MIN_ONBOARD_RELAYS as u16,
            special_state_on_relay2: false,

            sensors: core::array::from_fn(SensorProperties::factory),
            relays: core::array::from_fn(|i| RelayProperties {
                active: i < MIN_ONBOARD_RELAYS,
                // Fault relay is held energized so a dead controller alarms.
                energized: i == 0,
                buzzer_on: i == ALARM_LEVELS,
                ..RelayProperties::default()
            }),
            relay_timers: [RelayTimer::DISABLED; RELAY_TIMERS],
        }
    }
}

impl Settings {
    /// Number of sensor slots the controller evaluates.
    pub fn sensor_count(&self) -> usize {
        (self.nr_of_sensors as usize).min(MAX_SENSORS)
    }

    pub fn relay_count(&self) -> usize {
        (self.nr_of_relays as usize).min(MAX_RELAYS)
    }

    /// Index of the relay that signals special sensor states.
    pub fn special_state_relay(&self) -> usize {
        usize::from(self.special_state_on_relay2)
    }

    /// Export for the configuration tool.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Import from the configuration tool.  The result still has to pass
    /// [`validate_settings`] before it is committed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Range-check a configuration before it is sealed and committed.
///
/// Invalid values are rejected, never clamped.
pub fn validate_settings(s: &Settings) -> Result<(), &'static str> {
    if s.nr_of_sensors as usize > MAX_SENSORS {
        return Err("nr_of_sensors must be 0–128");
    }
    if s.nr_of_relays as usize > MAX_RELAYS {
        return Err("nr_of_relays must be 0–128");
    }
    if s.temperature_range_low > s.temperature_range_high {
        return Err("temperature_range_low must be <= temperature_range_high");
    }
    if s.startup_time_s > TIMER_MAX_SECS {
        return Err("startup_time_s exceeds timer range");
    }

    for sensor in &s.sensors {
        validate_sensor(sensor)?;
    }

    for relay in &s.relays {
        if relay.max_on_time > RELAY_ON_TIMER_MAX_SECS {
            return Err("relay max_on_time must be 0–4095");
        }
    }

    for timer in &s.relay_timers {
        if !(-1..MINUTES_PER_DAY).contains(&timer.on_time)
            || !(-1..MINUTES_PER_DAY).contains(&timer.off_time)
        {
            return Err("relay timer minutes must be -1 (off) or 0–1439");
        }
    }
    Ok(())
}

fn validate_sensor(p: &SensorProperties) -> Result<(), &'static str> {
    if p.value_average_time_m > MAX_AVERAGE_TIME_M {
        return Err("value_average_time_m must be 0–60");
    }
    if p.measuring_range <= 0 {
        return Err("measuring_range must be positive");
    }
    if p.fault_on_delay > TIMER_MAX_SECS || p.fault_off_delay > TIMER_MAX_SECS {
        return Err("fault delay exceeds timer range");
    }
    for alarm in &p.alarms {
        if alarm.on_delay > TIMER_MAX_SECS || alarm.off_delay > TIMER_MAX_SECS {
            return Err("alarm delay exceeds timer range");
        }
        match p.mode {
            MeasurementMode::Normal if alarm.on_level < alarm.off_level => {
                return Err("normal mode requires on_level >= off_level");
            }
            MeasurementMode::Oxygen if alarm.on_level > alarm.off_level => {
                return Err("oxygen mode requires on_level <= off_level");
            }
            _ => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helper for arrays longer than serde's built-in 32
// ---------------------------------------------------------------------------

mod fixed_array {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T, const N: usize>(arr: &[T; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut seq = serializer.serialize_seq(Some(N))?;
        for item in arr {
            seq.serialize_element(item)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D, T, const N: usize>(deserializer: D) -> Result<[T; N], D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let items = heapless::Vec::<T, N>::deserialize(deserializer)?;
        let len = items.len();
        items
            .into_array()
            .map_err(|_| D::Error::invalid_length(len, &"a full slot table"))
    }
}
