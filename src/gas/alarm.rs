//! Hysteresis and delay state machine for one alarm level.
//!
//! ```text
//!            trigger                 timer = 0
//!   ┌─────┐ ────────▶ ┌───────────┐ ──────────▶ ┌────┐
//!   │ Off │           │ OnDelayed │             │ On │
//!   └─────┘ ◀──────── └───────────┘             └────┘
//!      ▲    no trigger                 release │  ▲
//!      │                                       ▼  │ no release
//!      │         timer = 0          ┌────────────┐│
//!      └─────────────────────────── │ OffDelayed │┘
//!                                   └────────────┘
//! ```
//!
//! The machine does not know thresholds.  The caller classifies the
//! value into a [`Zone`] and passes the configured delays.

use core::fmt;

use crate::config::{MeasurementMode, TIMER_MAX_SECS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlarmState {
    #[default]
    Off,
    OnDelayed,
    On,
    OffDelayed,
}

impl AlarmState {
    /// `On` and `OffDelayed` hold the assigned relays.
    pub fn drives_outputs(self) -> bool {
        matches!(self, Self::On | Self::OffDelayed)
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::OnDelayed => "on-delayed",
            Self::On => "on",
            Self::OffDelayed => "off-delayed",
        };
        f.write_str(s)
    }
}

/// Where a value sits relative to an alarm's thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Past the on-threshold in the alarming direction.
    Trigger,
    /// Inside the hysteresis gap.
    Hold,
    /// Back past the off-threshold.
    Release,
}

impl Zone {
    /// Classify `value` for the given mode.
    ///
    /// Window mode alarms outside `[min(on, off), max(on, off)]` and
    /// releases inside it; it has no hysteresis gap.
    pub fn classify(mode: MeasurementMode, on_level: i16, off_level: i16, value: i16) -> Self {
        match mode {
            MeasurementMode::Normal => {
                if value >= on_level {
                    Self::Trigger
                } else if value < off_level {
                    Self::Release
                } else {
                    Self::Hold
                }
            }
            MeasurementMode::Oxygen => {
                if value <= on_level {
                    Self::Trigger
                } else if value > off_level {
                    Self::Release
                } else {
                    Self::Hold
                }
            }
            MeasurementMode::Window => {
                let low = on_level.min(off_level);
                let high = on_level.max(off_level);
                if value < low || value > high {
                    Self::Trigger
                } else {
                    Self::Release
                }
            }
        }
    }

    /// Two-state classification for the fault alarm.
    pub fn from_condition(active: bool) -> Self {
        if active { Self::Trigger } else { Self::Release }
    }
}

/// Runtime state of one alarm level: state plus a 14-bit countdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmMachine {
    state: AlarmState,
    timer: u16,
}

impl AlarmMachine {
    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Seconds left on the running on/off delay.
    pub fn timer(&self) -> u16 {
        self.timer
    }

    /// Advance by `dt` seconds.  Returns the previous state if it changed.
    pub fn step(&mut self, zone: Zone, on_delay: u16, off_delay: u16, dt: u16) -> Option<AlarmState> {
        let before = self.state;
        match self.state {
            AlarmState::Off => {
                if zone == Zone::Trigger {
                    self.arm(AlarmState::OnDelayed, AlarmState::On, on_delay);
                }
            }
            AlarmState::OnDelayed => {
                if zone == Zone::Trigger {
                    self.timer = self.timer.saturating_sub(dt);
                    if self.timer == 0 {
                        self.state = AlarmState::On;
                    }
                } else {
                    self.state = AlarmState::Off;
                    self.timer = 0;
                }
            }
            AlarmState::On => {
                if zone == Zone::Release {
                    self.arm(AlarmState::OffDelayed, AlarmState::Off, off_delay);
                }
            }
            AlarmState::OffDelayed => {
                if zone == Zone::Release {
                    self.timer = self.timer.saturating_sub(dt);
                    if self.timer == 0 {
                        self.state = AlarmState::Off;
                    }
                } else {
                    self.state = AlarmState::On;
                    self.timer = 0;
                }
            }
        }
        (self.state != before).then_some(before)
    }

    /// Force back to `Off`.  Returns the previous state if it changed.
    pub fn reset(&mut self) -> Option<AlarmState> {
        let before = self.state;
        *self = Self::default();
        (before != AlarmState::Off).then_some(before)
    }

    fn arm(&mut self, delayed: AlarmState, settled: AlarmState, delay: u16) {
        let delay = delay.min(TIMER_MAX_SECS);
        if delay == 0 {
            self.state = settled;
            self.timer = 0;
        } else {
            self.state = delayed;
            self.timer = delay;
        }
    }
}
