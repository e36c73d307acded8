//! Relay controller: turns alarm demand and timer windows into coil states.
//!
//! Per relay, every tick:
//!
//! 1. `demand = alarm demand ∨ timer window`
//! 2. manual reset: an alarm-driven relay latches until acknowledged
//! 3. max-on-time: a relay driven for `max_on_time` seconds is forced
//!    off until the timeout is cleared
//! 4. pulsating: 1 s on / 1 s off while logically on
//! 5. polarity: `energized` relays hold their coil in the quiet state
//! 6. test override forces the coil regardless of the above

pub mod timer;

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::config::{MAX_RELAYS, RELAY_ON_TIMER_MAX_SECS, Settings};
use crate::error::CommandError;
use crate::relay_set::RelaySet;

/// Half period of a pulsating relay, in seconds.
pub const PULSE_HALF_PERIOD_S: u16 = 1;

/// Operator override of a relay coil for commissioning tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TestCoil {
    #[default]
    None,
    On,
    Off,
}

/// Runtime state of one relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayRuntime {
    /// Seconds the relay has been driven continuously (12-bit).
    pub on_timer: u16,
    pub test_coil: TestCoil,
    /// Alarm latched, waiting for an acknowledge.
    pub wait_for_reset: bool,
    pub max_on_timed_out: bool,
    /// Logical state after latch and max-on-time, before pulsing.
    pub logical: bool,
    /// Pulse phase while logically on.
    pulse_on: bool,
    /// Seconds since the last pulse phase change.
    pulse_acc: u16,
}

impl RelayRuntime {
    /// The first driven tick starts in the on phase.  A tick longer than
    /// the half period flips the phase once.
    fn advance_pulse(&mut self, was_on: bool, dt: u16) {
        if !self.logical {
            self.pulse_on = false;
            self.pulse_acc = 0;
        } else if !was_on {
            self.pulse_on = true;
            self.pulse_acc = 0;
        } else {
            self.pulse_acc = self.pulse_acc.saturating_add(dt);
            if self.pulse_acc >= PULSE_HALF_PERIOD_S {
                self.pulse_on = !self.pulse_on;
                self.pulse_acc = 0;
            }
        }
    }
}

/// Outputs of one controller update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutputs {
    /// Physical coils: member ⇔ energized.
    pub coils: RelaySet,
    pub buzzer: bool,
}

pub struct RelayController {
    relays: [RelayRuntime; MAX_RELAYS],
    outputs: RelayOutputs,
}

impl Default for RelayController {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayController {
    pub fn new() -> Self {
        Self {
            relays: [RelayRuntime::default(); MAX_RELAYS],
            outputs: RelayOutputs::default(),
        }
    }

    pub fn runtime(&self, relay: usize) -> Option<&RelayRuntime> {
        self.relays.get(relay)
    }

    pub fn outputs(&self) -> RelayOutputs {
        self.outputs
    }

    /// Recompute every relay.
    ///
    /// `special_state` drives the special-state relay.  `minute` is the
    /// time of day for the relay timers.
    pub fn update(
        &mut self,
        settings: &Settings,
        alarm_demand: &RelaySet,
        special_state: bool,
        minute: Option<u16>,
        dt: u16,
        sink: &mut impl EventSink,
    ) -> RelayOutputs {
        let mut alarms = *alarm_demand;
        if special_state {
            alarms.insert(settings.special_state_relay());
        }
        let timers = timer::timer_demand(&settings.relay_timers, minute);
        let count = settings.relay_count();

        let mut outputs = RelayOutputs::default();
        for (i, (rt, props)) in self.relays.iter_mut().zip(settings.relays.iter()).enumerate() {
            let was_on = rt.logical;

            let coil = if i < count && props.active {
                let alarm = alarms.contains(i);
                if props.manual_reset && alarm {
                    rt.wait_for_reset = true;
                }
                if props.immediate_reset {
                    rt.wait_for_reset = false;
                }

                let driven = alarm || timers.contains(i) || rt.wait_for_reset;
                if driven {
                    if !rt.max_on_timed_out {
                        rt.on_timer = rt.on_timer.saturating_add(dt).min(RELAY_ON_TIMER_MAX_SECS);
                        if props.max_on_time > 0 && rt.on_timer >= props.max_on_time {
                            rt.max_on_timed_out = true;
                            warn!("relay {}: max on-time {} s reached, forced off", i + 1, props.max_on_time);
                            sink.emit(&AppEvent::MaxOnTimedOut { relay: i });
                        }
                    }
                } else {
                    rt.on_timer = 0;
                }
                rt.logical = driven && !rt.max_on_timed_out;
                rt.advance_pulse(was_on, dt);

                if props.buzzer_on && rt.logical {
                    outputs.buzzer = true;
                }

                let active = rt.logical && (!props.pulsating || rt.pulse_on);
                active != props.energized
            } else {
                rt.logical = false;
                rt.on_timer = 0;
                false
            };

            let coil = match rt.test_coil {
                TestCoil::None => coil,
                TestCoil::On => true,
                TestCoil::Off => false,
            };
            if coil {
                outputs.coils.insert(i);
            }

            if rt.logical != was_on {
                debug!("relay {}: {}", i + 1, if rt.logical { "on" } else { "off" });
                sink.emit(&AppEvent::RelayChanged {
                    relay: i,
                    on: rt.logical,
                });
            }
        }

        self.outputs = outputs;
        outputs
    }

    // ── Commands ──────────────────────────────────────────────

    /// Acknowledge a manual-reset latch.  The relay stays on while the
    /// alarm is still present.
    pub fn acknowledge(&mut self, relay: usize) -> Result<(), CommandError> {
        let rt = self.relay_mut(relay)?;
        if rt.wait_for_reset {
            info!("relay {}: acknowledged", relay + 1);
        }
        rt.wait_for_reset = false;
        Ok(())
    }

    pub fn acknowledge_all(&mut self) {
        for rt in &mut self.relays {
            rt.wait_for_reset = false;
        }
        info!("all relays acknowledged");
    }

    pub fn clear_max_on_timeout(&mut self, relay: usize) -> Result<(), CommandError> {
        let rt = self.relay_mut(relay)?;
        if rt.max_on_timed_out {
            info!("relay {}: max on-time timeout cleared", relay + 1);
        }
        rt.max_on_timed_out = false;
        rt.on_timer = 0;
        Ok(())
    }

    pub fn set_test_coil(&mut self, relay: usize, mode: TestCoil) -> Result<(), CommandError> {
        let rt = self.relay_mut(relay)?;
        info!("relay {}: test coil {:?}", relay + 1, mode);
        rt.test_coil = mode;
        Ok(())
    }

    /// Drop all runtime state of a relay after its properties changed.
    /// Test overrides are kept.
    pub fn reset(&mut self, relay: usize) {
        if let Some(rt) = self.relays.get_mut(relay) {
            *rt = RelayRuntime {
                test_coil: rt.test_coil,
                ..RelayRuntime::default()
            };
        }
    }

    fn relay_mut(&mut self, relay: usize) -> Result<&mut RelayRuntime, CommandError> {
        self.relays
            .get_mut(relay)
            .ok_or(CommandError::NoSuchRelay(relay))
    }
}
