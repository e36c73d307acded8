//! On-flash byte layout of the [`Settings`] payload.
//!
//! The layout is a compatibility contract with the configuration tool:
//! little-endian, packed, fields in declaration order of the version-6
//! structure.  Encoding and decoding are explicit; nothing here depends on
//! the in-memory representation of the Rust types.
//!
//! ```text
//!  payload (24058 bytes)
//!  ┌────────────┬──────────────────────┬────────────────────┬──────────────┐
//!  │ header 162 │ 128 × sensor (178)   │ 128 × relay (8)    │ 4 × timer 22 │
//!  └────────────┴──────────────────────┴────────────────────┴──────────────┘
//! ```
//!
//! [`offsets`] gives the payload-relative position of every field so the
//! flash-programming collaborator can perform partial updates.

use core::fmt;
use core::ops::Range;

use super::{
    AlarmProperties, FaultCauses, FixedText, MAX_RELAYS, MAX_SENSORS,
    MeasurementMode, RELAY_TIMERS, RelayProperties, RelayTimer, SensorProperties, Settings,
    ValueSource,
};
use crate::relay_set::RelaySet;

pub const RELAY_SET_LEN: usize = 16;
pub const HEADER_LEN: usize = 162;
pub const ALARM_LEN: usize = 25;
pub const SENSOR_LEN: usize = 178;
pub const RELAY_LEN: usize = 8;
pub const TIMER_LEN: usize = 22;
pub const PAYLOAD_LEN: usize =
    HEADER_LEN + MAX_SENSORS * SENSOR_LEN + MAX_RELAYS * RELAY_LEN + RELAY_TIMERS * TIMER_LEN;

/// Flash programming granularity used when aligning changed spans.
pub const PROGRAM_WORD: usize = 4;

/// Payload-relative byte offsets.
pub mod offsets {
    use super::{ALARM_LEN, HEADER_LEN, RELAY_LEN, SENSOR_LEN, TIMER_LEN};
    use crate::config::{MAX_RELAYS, MAX_SENSORS};

    pub const DATE: usize = 0;
    pub const NAME: usize = 12;
    pub const LED_MATRIX_TYPE: usize = 20;
    pub const PASSWORD_CODE: usize = 21;
    pub const ALARM_TEXT: usize = 29;
    pub const FAULT_TEXT: usize = 93;
    pub const INACTIVE_TEXT: usize = 109;
    pub const SERVICE_TEXT: usize = 125;
    pub const TEMPERATURE_RANGE_LOW: usize = 141;
    pub const TEMPERATURE_RANGE_HIGH: usize = 143;
    pub const SERIAL_NR: usize = 145;
    pub const CPU_TYPE: usize = 149;
    pub const STARTUP_TIME_S: usize = 151;
    pub const BEEPER_FREQUENCY: usize = 153;
    pub const SERVICE_INTERVAL_D: usize = 155;
    pub const NR_OF_SENSORS: usize = 157;
    pub const NR_OF_RELAYS: usize = 159;
    pub const SPECIAL_STATE_ON_RELAY2: usize = 161;

    pub const SENSORS: usize = HEADER_LEN;
    pub const RELAYS: usize = SENSORS + MAX_SENSORS * SENSOR_LEN;
    pub const RELAY_TIMERS: usize = RELAYS + MAX_RELAYS * RELAY_LEN;

    /// Field offsets inside one sensor record.
    pub mod sensor_field {
        pub const ACTIVE: usize = 0;
        pub const MODE: usize = 1;
        pub const MEASURING_RANGE: usize = 2;
        pub const OFFSET: usize = 4;
        pub const DECIMAL_POINT: usize = 6;
        pub const VALUE_AVERAGE_TIME_M: usize = 7;
        pub const MEASURING_UNIT: usize = 8;
        pub const SENSOR_NAME: usize = 16;
        pub const LOCATION_NAME: usize = 32;
        pub const ALARMS: usize = 56;
        pub const FAULT_VALUE_SOURCE: usize = 156;
        pub const FAULT_CAUSES: usize = 157;
        pub const FAULT_ON_DELAY: usize = 158;
        pub const FAULT_OFF_DELAY: usize = 160;
        pub const FAULT_RELAYS: usize = 162;
    }

    /// Field offsets inside one alarm record.
    pub mod alarm_field {
        pub const VALUE_SOURCE: usize = 0;
        pub const ON_LEVEL: usize = 1;
        pub const OFF_LEVEL: usize = 3;
        pub const ON_DELAY: usize = 5;
        pub const OFF_DELAY: usize = 7;
        pub const RELAYS: usize = 9;
    }

    /// Field offsets inside one relay record.
    pub mod relay_field {
        pub const ACTIVE: usize = 0;
        pub const ENERGIZED: usize = 1;
        pub const PULSATING: usize = 2;
        pub const MANUAL_RESET: usize = 3;
        pub const IMMEDIATE_RESET: usize = 4;
        pub const BUZZER_ON: usize = 5;
        pub const MAX_ON_TIME: usize = 6;
    }

    /// Field offsets inside one relay-timer record.
    pub mod timer_field {
        pub const MODE: usize = 0;
        pub const ON_TIME: usize = 2;
        pub const OFF_TIME: usize = 4;
        pub const RELAYS: usize = 6;
    }

    pub const fn sensor(index: usize) -> usize {
        SENSORS + index * SENSOR_LEN
    }

    pub const fn alarm(sensor_index: usize, level: usize) -> usize {
        sensor(sensor_index) + sensor_field::ALARMS + level * ALARM_LEN
    }

    pub const fn relay(index: usize) -> usize {
        RELAYS + index * RELAY_LEN
    }

    pub const fn relay_timer(index: usize) -> usize {
        RELAY_TIMERS + index * TIMER_LEN
    }

    /// Convert a payload offset into an offset from the start of the
    /// sealed descriptor (past `magic_begin` and `version`).
    pub const fn descriptor_offset(payload_offset: usize) -> usize {
        payload_offset + 8
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Buffer is shorter than the payload.
    Truncated { needed: usize, got: usize },
    /// An enumeration byte holds an undefined discriminant.
    InvalidEnum { offset: usize, value: u8 },
    /// A flag or bit-field byte has bits outside its defined set.
    InvalidFlags { offset: usize, value: u8 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, got } => {
                write!(f, "payload truncated: need {needed} bytes, got {got}")
            }
            Self::InvalidEnum { offset, value } => {
                write!(f, "invalid enum value {value} at payload offset {offset}")
            }
            Self::InvalidFlags { offset, value } => {
                write!(f, "invalid flag byte 0x{value:02X} at payload offset {offset}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

struct Encoder {
    out: Vec<u8>,
}

impl Encoder {
    fn with_capacity(cap: usize) -> Self {
        Self {
            out: Vec::with_capacity(cap),
        }
    }

    fn u8(&mut self, v: u8) {
        self.out.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.out.push(u8::from(v));
    }

    fn u16(&mut self, v: u16) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn i16(&mut self, v: i16) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn text<const N: usize>(&mut self, t: &FixedText<N>) {
        self.out.extend_from_slice(t.as_bytes());
    }

    fn relays(&mut self, set: &RelaySet) {
        for word in set.words() {
            self.out.extend_from_slice(&word.to_le_bytes());
        }
    }

    fn alarm(&mut self, a: &AlarmProperties) {
        self.u8(a.value_source as u8);
        self.i16(a.on_level);
        self.i16(a.off_level);
        self.u16(a.on_delay);
        self.u16(a.off_delay);
        self.relays(&a.relays);
    }

    fn sensor(&mut self, p: &SensorProperties) {
        self.bool(p.active);
        self.u8(p.mode as u8);
        self.i16(p.measuring_range);
        self.i16(p.offset);
        self.u8(p.decimal_point);
        self.u8(p.value_average_time_m);
        self.text(&p.measuring_unit);
        self.text(&p.sensor_name);
        self.text(&p.location_name);
        for alarm in &p.alarms {
            self.alarm(alarm);
        }
        self.u8(p.fault_value_source as u8);
        self.u8(p.fault_causes.bits());
        self.u16(p.fault_on_delay);
        self.u16(p.fault_off_delay);
        self.relays(&p.fault_relays);
    }

    fn relay(&mut self, r: &RelayProperties) {
        self.bool(r.active);
        self.bool(r.energized);
        self.bool(r.pulsating);
        self.bool(r.manual_reset);
        self.bool(r.immediate_reset);
        self.bool(r.buzzer_on);
        self.u16(r.max_on_time);
    }

    fn timer(&mut self, t: &RelayTimer) {
        self.i16(t.mode);
        self.i16(t.on_time);
        self.i16(t.off_time);
        self.relays(&t.relays);
    }
}

/// Serialize a settings payload into its flash layout.
pub fn encode_payload(s: &Settings) -> Vec<u8> {
    let mut e = Encoder::with_capacity(PAYLOAD_LEN);

    e.text(&s.date);
    e.text(&s.name);
    e.u8(s.led_matrix_type);
    e.u64(s.password_code);
    for text in &s.alarm_text {
        e.text(text);
    }
    e.text(&s.fault_text);
    e.text(&s.inactive_text);
    e.text(&s.service_text);
    e.i16(s.temperature_range_low);
    e.i16(s.temperature_range_high);
    e.i32(s.serial_nr);
    e.i16(s.cpu_type);
    e.u16(s.startup_time_s);
    e.u16(s.beeper_frequency);
    e.u16(s.service_interval_d);
    e.u16(s.nr_of_sensors);
    e.u16(s.nr_of_relays);
    e.bool(s.special_state_on_relay2);

    for sensor in &s.sensors {
        e.sensor(sensor);
    }
    for relay in &s.relays {
        e.relay(relay);
    }
    for timer in &s.relay_timers {
        e.timer(timer);
    }

    debug_assert_eq!(e.out.len(), PAYLOAD_LEN);
    e.out
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], LayoutError> {
        let end = self.pos + N;
        let slice = self.buf.get(self.pos..end).ok_or(LayoutError::Truncated {
            needed: end,
            got: self.buf.len(),
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, LayoutError> {
        Ok(self.take::<1>()?[0])
    }

    fn bool(&mut self) -> Result<bool, LayoutError> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(LayoutError::InvalidFlags { offset, value }),
        }
    }

    fn u16(&mut self) -> Result<u16, LayoutError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16, LayoutError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, LayoutError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, LayoutError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn text<const N: usize>(&mut self) -> Result<FixedText<N>, LayoutError> {
        Ok(FixedText::from_bytes(self.take()?))
    }

    fn relays(&mut self) -> Result<RelaySet, LayoutError> {
        let mut words = [0u32; 4];
        for word in &mut words {
            *word = u32::from_le_bytes(self.take()?);
        }
        Ok(RelaySet::from_words(words))
    }

    fn value_source(&mut self) -> Result<ValueSource, LayoutError> {
        let offset = self.pos;
        let value = self.u8()?;
        ValueSource::from_u8(value).ok_or(LayoutError::InvalidEnum { offset, value })
    }

    fn fault_causes(&mut self) -> Result<FaultCauses, LayoutError> {
        let offset = self.pos;
        let value = self.u8()?;
        FaultCauses::from_bits(value).ok_or(LayoutError::InvalidFlags { offset, value })
    }

    fn mode(&mut self) -> Result<MeasurementMode, LayoutError> {
        let offset = self.pos;
        let value = self.u8()?;
        MeasurementMode::from_u8(value).ok_or(LayoutError::InvalidEnum { offset, value })
    }

    fn alarm(&mut self) -> Result<AlarmProperties, LayoutError> {
        Ok(AlarmProperties {
            value_source: self.value_source()?,
            on_level: self.i16()?,
            off_level: self.i16()?,
            on_delay: self.u16()?,
            off_delay: self.u16()?,
            relays: self.relays()?,
        })
    }

    fn sensor(&mut self, p: &mut SensorProperties) -> Result<(), LayoutError> {
        p.active = self.bool()?;
        p.mode = self.mode()?;
        p.measuring_range = self.i16()?;
        p.offset = self.i16()?;
        p.decimal_point = self.u8()?;
        p.value_average_time_m = self.u8()?;
        p.measuring_unit = self.text()?;
        p.sensor_name = self.text()?;
        p.location_name = self.text()?;
        for alarm in &mut p.alarms {
            *alarm = self.alarm()?;
        }
        p.fault_value_source = self.value_source()?;
        p.fault_causes = self.fault_causes()?;
        p.fault_on_delay = self.u16()?;
        p.fault_off_delay = self.u16()?;
        p.fault_relays = self.relays()?;
        Ok(())
    }

    fn relay(&mut self) -> Result<RelayProperties, LayoutError> {
        Ok(RelayProperties {
            active: self.bool()?,
            energized: self.bool()?,
            pulsating: self.bool()?,
            manual_reset: self.bool()?,
            immediate_reset: self.bool()?,
            buzzer_on: self.bool()?,
            max_on_time: self.u16()?,
        })
    }

    fn timer(&mut self) -> Result<RelayTimer, LayoutError> {
        Ok(RelayTimer {
            mode: self.i16()?,
            on_time: self.i16()?,
            off_time: self.i16()?,
            relays: self.relays()?,
        })
    }
}

/// Parse a flash payload.  `bytes` must hold at least [`PAYLOAD_LEN`] bytes;
/// anything beyond is ignored.
pub fn decode_payload(bytes: &[u8]) -> Result<Settings, LayoutError> {
    if bytes.len() < PAYLOAD_LEN {
        return Err(LayoutError::Truncated {
            needed: PAYLOAD_LEN,
            got: bytes.len(),
        });
    }

    let mut d = Decoder::new(&bytes[..PAYLOAD_LEN]);
    let mut s = Settings::default();

    s.date = d.text()?;
    s.name = d.text()?;
    s.led_matrix_type = d.u8()?;
    s.password_code = d.u64()?;
    for text in &mut s.alarm_text {
        *text = d.text()?;
    }
    s.fault_text = d.text()?;
    s.inactive_text = d.text()?;
    s.service_text = d.text()?;
    s.temperature_range_low = d.i16()?;
    s.temperature_range_high = d.i16()?;
    s.serial_nr = d.i32()?;
    s.cpu_type = d.i16()?;
    s.startup_time_s = d.u16()?;
    s.beeper_frequency = d.u16()?;
    s.service_interval_d = d.u16()?;
    s.nr_of_sensors = d.u16()?;
    s.nr_of_relays = d.u16()?;
    s.special_state_on_relay2 = d.bool()?;

    for sensor in &mut s.sensors {
        d.sensor(sensor)?;
    }
    for relay in &mut s.relays {
        *relay = d.relay()?;
    }
    for timer in &mut s.relay_timers {
        *timer = d.timer()?;
    }

    Ok(s)
}

// ---------------------------------------------------------------------------
// Partial update support
// ---------------------------------------------------------------------------

/// Byte ranges that differ between two images of equal length, widened
/// to [`PROGRAM_WORD`] alignment and merged when adjacent.
///
/// Images of different length yield a single span covering `new`.
pub fn changed_spans(old: &[u8], new: &[u8]) -> Vec<Range<usize>> {
    if old.len() != new.len() {
        return vec![0..new.len()];
    }

    let len = new.len();
    let mut spans: Vec<Range<usize>> = Vec::new();
    let mut i = 0;
    while i < len {
        if old[i] == new[i] {
            i += 1;
            continue;
        }
        let start = i - i % PROGRAM_WORD;
        while i < len && old[i] != new[i] {
            i += 1;
        }
        let end = i.div_ceil(PROGRAM_WORD).saturating_mul(PROGRAM_WORD).min(len);

        match spans.last_mut() {
            Some(last) if last.end >= start => last.end = last.end.max(end),
            _ => spans.push(start..end),
        }
        i = end;
    }
    spans
}
