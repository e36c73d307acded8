//! Gas detection runtime: per-sensor alarm evaluation for all 128 slots.
//!
//! ```text
//!  SensorPort ──▶ SensorChannel[0..128] ──▶ relay demand (RelaySet)
//!                  average · inhibit ·        special-state flag
//!                  faults · alarms
//! ```
//!
//! [`GasDetection`] also runs the global startup countdown: after boot no
//! thresholds are monitored for `startup_time_s` seconds while sensor
//! modules warm up.

pub mod alarm;
pub mod average;
pub mod channel;
pub mod fault;
pub mod inhibit;

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, SensorPort};
use crate::config::{MAX_SENSORS, Settings, TIMER_MAX_SECS};
use crate::error::CommandError;
use crate::relay_set::RelaySet;

pub use alarm::{AlarmMachine, AlarmState, Zone};
pub use average::{AVERAGE_CAPACITY, MovingAverage};
pub use channel::{AlarmLevel, OperatingState, RangeState, SensorChannel, SensorValues};
pub use fault::{FaultCode, FaultFlags};
pub use inhibit::{DEFAULT_INHIBIT_SECS, Inhibit, InhibitKind};

/// One reading delivered by a sensor module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorSample {
    /// Range-adapted value in display units.
    pub value: i16,
    /// Raw loop-current value.
    pub loop_value: i16,
    /// Faults the module reports alongside the value.
    pub faults: FaultFlags,
}

impl SensorSample {
    pub fn new(value: i16) -> Self {
        Self {
            value,
            loop_value: value,
            faults: FaultFlags::NONE,
        }
    }
}

pub struct GasDetection {
    channels: Vec<SensorChannel>,
    startup_remaining: u16,
}

impl GasDetection {
    pub fn new(settings: &Settings) -> Self {
        Self {
            channels: settings
                .sensors
                .iter()
                .enumerate()
                .map(|(i, props)| SensorChannel::new(i, props))
                .collect(),
            startup_remaining: settings.startup_time_s.min(TIMER_MAX_SECS),
        }
    }

    pub fn in_startup(&self) -> bool {
        self.startup_remaining > 0
    }

    pub fn startup_remaining(&self) -> u16 {
        self.startup_remaining
    }

    /// Cap a running startup delay at `seconds`.  Never lengthens it.
    pub fn shorten_startup(&mut self, seconds: u16, sink: &mut impl EventSink) {
        if self.startup_remaining <= seconds {
            return;
        }
        self.startup_remaining = seconds;
        if seconds == 0 {
            info!("startup delay cut short, monitoring thresholds");
            sink.emit(&AppEvent::StartupComplete);
        }
    }

    pub fn channel(&self, index: usize) -> Option<&SensorChannel> {
        self.channels.get(index)
    }

    pub fn channels(&self) -> impl Iterator<Item = &SensorChannel> {
        self.channels.iter()
    }

    /// Run one tick over every slot.
    pub fn tick(
        &mut self,
        settings: &Settings,
        port: &mut impl SensorPort,
        dt: u16,
        sink: &mut impl EventSink,
    ) {
        if self.startup_remaining > 0 {
            self.startup_remaining = self.startup_remaining.saturating_sub(dt);
            if self.startup_remaining == 0 {
                info!("startup delay complete, monitoring thresholds");
                sink.emit(&AppEvent::StartupComplete);
            }
        }
        let in_startup = self.in_startup();
        let count = settings.sensor_count();

        for (i, (channel, props)) in self
            .channels
            .iter_mut()
            .zip(settings.sensors.iter())
            .enumerate()
        {
            if i >= count || !props.active {
                channel.switch_off(sink);
                continue;
            }
            let sample = port.read(i);
            channel.tick(props, sample, in_startup, dt, sink);
        }
    }

    /// Union of the relays demanded by every active sensor.
    pub fn relay_demand(&self, settings: &Settings) -> RelaySet {
        let mut demand = RelaySet::EMPTY;
        for (channel, props) in self.channels.iter().zip(settings.sensors.iter()) {
            demand.union_with(&channel.relay_demand(props));
        }
        demand
    }

    /// `true` while any sensor is in a state signalled on the special-state relay.
    pub fn special_state_active(&self) -> bool {
        self.channels.iter().any(|c| c.state().is_special())
    }

    pub fn inhibit(
        &mut self,
        sensor: usize,
        kind: InhibitKind,
        sink: &mut impl EventSink,
    ) -> Result<(), CommandError> {
        let channel = self.channel_mut(sensor)?;
        channel.start_inhibit(kind, sink);
        Ok(())
    }

    pub fn release_inhibit(&mut self, sensor: usize, sink: &mut impl EventSink) -> Result<(), CommandError> {
        let in_startup = self.in_startup();
        let channel = self.channel_mut(sensor)?;
        channel.release_inhibit(in_startup, sink);
        Ok(())
    }

    /// Sensors currently inhibited permanently.
    pub fn permanently_inhibited(&self) -> impl Iterator<Item = usize> + '_ {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.inhibit().kind() == Some(InhibitKind::Permanent))
            .map(|(i, _)| i)
    }

    /// Re-apply properties of one slot after a configuration change.
    pub fn reconfigure(&mut self, settings: &Settings, sensor: usize, sink: &mut impl EventSink) {
        if let (Some(channel), Some(props)) = (self.channels.get_mut(sensor), settings.sensors.get(sensor)) {
            channel.reconfigure(props, sink);
        }
    }

    pub fn reconfigure_all(&mut self, settings: &Settings, sink: &mut impl EventSink) {
        for (channel, props) in self.channels.iter_mut().zip(settings.sensors.iter()) {
            channel.reconfigure(props, sink);
        }
    }

    fn channel_mut(&mut self, sensor: usize) -> Result<&mut SensorChannel, CommandError> {
        if sensor >= MAX_SENSORS {
            return Err(CommandError::NoSuchSensor(sensor));
        }
        self.channels
            .get_mut(sensor)
            .ok_or(CommandError::NoSuchSensor(sensor))
    }
}
