//! Runtime state of one sensor slot.
//!
//! A channel owns the moving average, the inhibit timer, the fault mask
//! and five alarm machines (four levels plus the fault alarm).  It is
//! driven once per tick by [`GasDetection`](super::GasDetection) with the
//! slot's static [`SensorProperties`].

use core::fmt;

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::config::{ALARM_LEVELS, SensorProperties, ValueSource};
use crate::relay_set::RelaySet;

use super::alarm::{AlarmMachine, AlarmState, Zone};
use super::average::MovingAverage;
use super::fault::{FaultCode, FaultFlags, FaultSupervisor};
use super::inhibit::{Inhibit, InhibitKind};
use super::SensorSample;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperatingState {
    /// Slot inactive or beyond the configured sensor count.
    #[default]
    Off,
    /// Global startup delay running; thresholds not monitored.
    Startup,
    Active,
    /// Inhibit requested, settles on the next tick.
    GoingInactive,
    InactivatedTemporarily,
    InactivatedPermanently,
}

impl OperatingState {
    /// States signalled on the special-state relay.
    pub fn is_special(self) -> bool {
        matches!(
            self,
            Self::Startup
                | Self::GoingInactive
                | Self::InactivatedTemporarily
                | Self::InactivatedPermanently
        )
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Startup => "startup",
            Self::Active => "active",
            Self::GoingInactive => "going inactive",
            Self::InactivatedTemporarily => "inactive (temporary)",
            Self::InactivatedPermanently => "inactive (permanent)",
        };
        f.write_str(s)
    }
}

/// An alarm slot of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmLevel {
    /// Threshold alarm `0..4` (displayed as A1..A4).
    Level(u8),
    Fault,
}

impl fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(l) => write!(f, "A{}", l + 1),
            Self::Fault => f.write_str("F"),
        }
    }
}

/// Position of the fault value source relative to the measuring range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangeState {
    #[default]
    InRange,
    Under,
    Over,
}

/// Current value of every source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorValues {
    pub normal: i16,
    /// Published average; `None` before the first window elapsed.
    pub average: Option<i16>,
    pub raw_20ma: i16,
}

impl SensorValues {
    pub fn get(&self, source: ValueSource) -> i16 {
        match source {
            ValueSource::Normal => self.normal,
            ValueSource::Average => self.average.unwrap_or(self.normal),
            ValueSource::Raw20mA => self.raw_20ma,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorChannel {
    index: usize,
    state: OperatingState,
    values: SensorValues,
    range: RangeState,
    alarms: [AlarmMachine; ALARM_LEVELS],
    fault_alarm: AlarmMachine,
    faults: FaultSupervisor,
    average: MovingAverage,
    inhibit: Inhibit,
}

impl SensorChannel {
    pub fn new(index: usize, props: &SensorProperties) -> Self {
        Self {
            index,
            state: OperatingState::Off,
            values: SensorValues::default(),
            range: RangeState::InRange,
            alarms: [AlarmMachine::default(); ALARM_LEVELS],
            fault_alarm: AlarmMachine::default(),
            faults: FaultSupervisor::default(),
            average: MovingAverage::new(props.value_average_time_m),
            inhibit: Inhibit::None,
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> OperatingState {
        self.state
    }

    pub fn values(&self) -> &SensorValues {
        &self.values
    }

    pub fn range(&self) -> RangeState {
        self.range
    }

    pub fn alarm(&self, level: usize) -> Option<AlarmState> {
        self.alarms.get(level).map(AlarmMachine::state)
    }

    pub fn fault_alarm(&self) -> AlarmState {
        self.fault_alarm.state()
    }

    pub fn faults(&self) -> FaultFlags {
        self.faults.faults()
    }

    pub fn primary_fault(&self) -> Option<FaultCode> {
        self.faults.faults().primary()
    }

    pub fn inhibit(&self) -> Inhibit {
        self.inhibit
    }

    /// Relays this sensor currently demands.  Empty unless `Active`.
    pub fn relay_demand(&self, props: &SensorProperties) -> RelaySet {
        let mut demand = RelaySet::EMPTY;
        if self.state != OperatingState::Active {
            return demand;
        }
        for (machine, alarm) in self.alarms.iter().zip(props.alarms.iter()) {
            if machine.state().drives_outputs() {
                demand.union_with(&alarm.relays);
            }
        }
        if self.fault_alarm.state().drives_outputs() {
            demand.union_with(&props.fault_relays);
        }
        demand
    }

    // ── Per-tick evaluation ───────────────────────────────────

    /// Run one control tick.
    pub fn tick(
        &mut self,
        props: &SensorProperties,
        sample: Option<SensorSample>,
        in_startup: bool,
        dt: u16,
        sink: &mut impl EventSink,
    ) {
        self.update_values(props, sample, dt, sink);

        if self.inhibit.is_active() {
            self.tick_inhibited(dt, in_startup, sink);
            return;
        }
        if in_startup {
            self.set_state(OperatingState::Startup, sink);
            return;
        }
        self.set_state(OperatingState::Active, sink);
        self.evaluate(props, dt, sink);
    }

    /// Slot is not evaluated at all.  A temporary inhibit is dropped; a
    /// permanent one is kept and settles again once the slot returns.
    pub fn switch_off(&mut self, sink: &mut impl EventSink) {
        if self.inhibit.kind() == Some(InhibitKind::Temporary) {
            info!("sensor {}: temporary inhibit dropped, slot switched off", self.index + 1);
            self.inhibit = Inhibit::None;
        }
        if self.state != OperatingState::Off {
            self.reset_alarms(sink);
            self.faults.clear();
            self.set_state(OperatingState::Off, sink);
        }
    }

    fn update_values(
        &mut self,
        props: &SensorProperties,
        sample: Option<SensorSample>,
        dt: u16,
        sink: &mut impl EventSink,
    ) {
        let reported = match sample {
            Some(s) => {
                self.values.normal = s.value;
                self.values.raw_20ma = s.loop_value;
                s.faults
            }
            None => [FaultCode::SensorOffline].into_iter().collect(),
        };

        self.average.tick(self.values.normal, dt);
        self.values.average = self.average.value();

        let value = self.values.get(props.fault_value_source);
        let range = if value < props.range_low() {
            RangeState::Under
        } else if value > props.range_high() {
            RangeState::Over
        } else {
            RangeState::InRange
        };

        let faults_changed = self.faults.evaluate(self.index, reported).is_some();
        if faults_changed || range != self.range {
            if range != self.range {
                warn!("sensor {}: range {:?} -> {:?}", self.index + 1, self.range, range);
            }
            self.range = range;
            sink.emit(&AppEvent::FaultCauseChanged {
                sensor: self.index,
                faults: self.faults.faults(),
                range,
            });
        }
    }

    fn evaluate(&mut self, props: &SensorProperties, dt: u16, sink: &mut impl EventSink) {
        for (level, (machine, alarm)) in self.alarms.iter_mut().zip(props.alarms.iter()).enumerate() {
            let value = self.values.get(alarm.value_source);
            let zone = Zone::classify(props.mode, alarm.on_level, alarm.off_level, value);
            if let Some(from) = machine.step(zone, alarm.on_delay, alarm.off_delay, dt) {
                emit_alarm(sink, self.index, AlarmLevel::Level(level as u8), from, machine.state());
            }
        }

        let causes = props.fault_causes;
        let fault = self.faults.has_faults()
            || (causes.under_range && self.range == RangeState::Under)
            || (causes.over_range && self.range == RangeState::Over);
        let zone = Zone::from_condition(fault);
        if let Some(from) = self
            .fault_alarm
            .step(zone, props.fault_on_delay, props.fault_off_delay, dt)
        {
            emit_alarm(sink, self.index, AlarmLevel::Fault, from, self.fault_alarm.state());
        }
    }

    fn tick_inhibited(&mut self, dt: u16, in_startup: bool, sink: &mut impl EventSink) {
        if matches!(self.state, OperatingState::GoingInactive | OperatingState::Off) {
            let settled = match self.inhibit.kind() {
                Some(InhibitKind::Permanent) => OperatingState::InactivatedPermanently,
                _ => OperatingState::InactivatedTemporarily,
            };
            self.set_state(settled, sink);
            return;
        }

        if self.inhibit.tick(dt) {
            info!("sensor {}: temporary inhibit expired", self.index + 1);
            self.reset_alarms(sink);
            let next = if in_startup {
                OperatingState::Startup
            } else {
                OperatingState::Active
            };
            self.set_state(next, sink);
        }
    }

    // ── Commands ──────────────────────────────────────────────

    /// Suspend evaluation.  Alarm machines freeze in place and the
    /// sensor stops demanding relays immediately.
    pub fn start_inhibit(&mut self, kind: InhibitKind, sink: &mut impl EventSink) {
        info!("sensor {}: inhibit {:?}", self.index + 1, kind);
        self.inhibit = Inhibit::start(kind);
        self.set_state(OperatingState::GoingInactive, sink);
    }

    /// Lift any inhibit.  All alarms re-arm from `Off`.
    pub fn release_inhibit(&mut self, in_startup: bool, sink: &mut impl EventSink) {
        if !self.inhibit.is_active() {
            return;
        }
        info!("sensor {}: inhibit released", self.index + 1);
        self.inhibit = Inhibit::None;
        self.reset_alarms(sink);
        let next = if in_startup {
            OperatingState::Startup
        } else {
            OperatingState::Active
        };
        self.set_state(next, sink);
    }

    /// Apply changed properties.  Alarms re-arm from `Off`; the average
    /// restarts if the window changed.  Inhibits survive.
    pub fn reconfigure(&mut self, props: &SensorProperties, sink: &mut impl EventSink) {
        let period = u32::from(props.value_average_time_m) * 60;
        if period != self.average.period_secs() {
            self.average = MovingAverage::new(props.value_average_time_m);
            self.values.average = None;
        }
        self.reset_alarms(sink);
    }

    // ── Internal ──────────────────────────────────────────────

    fn reset_alarms(&mut self, sink: &mut impl EventSink) {
        for (level, machine) in self.alarms.iter_mut().enumerate() {
            if let Some(from) = machine.reset() {
                emit_alarm(sink, self.index, AlarmLevel::Level(level as u8), from, AlarmState::Off);
            }
        }
        if let Some(from) = self.fault_alarm.reset() {
            emit_alarm(sink, self.index, AlarmLevel::Fault, from, AlarmState::Off);
        }
    }

    fn set_state(&mut self, to: OperatingState, sink: &mut impl EventSink) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("sensor {}: {} -> {}", self.index + 1, from, to);
        sink.emit(&AppEvent::SensorStateChanged {
            sensor: self.index,
            from,
            to,
        });
    }
}

fn emit_alarm(
    sink: &mut impl EventSink,
    sensor: usize,
    level: AlarmLevel,
    from: AlarmState,
    to: AlarmState,
) {
    debug!("sensor {} {}: {} -> {}", sensor + 1, level, from, to);
    sink.emit(&AppEvent::AlarmChanged {
        sensor,
        level,
        from,
        to,
    });
}
