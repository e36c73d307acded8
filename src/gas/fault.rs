//! Runtime fault codes reported by sensor modules.
//!
//! ## Fault lifecycle
//!
//! 1. A sensor module reports a fault bit with its sample, or stops
//!    answering (`SensorOffline`).
//! 2. [`FaultSupervisor`] latches the bit into the per-sensor mask and
//!    logs the edge.
//! 3. Any set bit drives the sensor's fault alarm machine, which applies
//!    the configured fault delays and relays.
//! 4. When the module stops reporting the bit, it is cleared again.
//!
//! Several faults may be active at once; the lowest-numbered code is the
//! one shown to the operator.

use core::fmt;

use log::{error, info};

/// Fault codes, ordered by display priority (lowest wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum FaultCode {
    AdOverflow = 0,
    AdUnderflow = 1,
    NoCalibration = 2,
    PowerRailLow = 3,
    TemperatureSensor = 4,
    Eeprom = 5,
    Watchdog = 6,
    Crc = 7,
    Ram = 8,
    SensorOffline = 9,
    SensorBlocked = 10,
    ObjectLoss = 11,
}

impl FaultCode {
    pub const ALL: [Self; 12] = [
        Self::AdOverflow,
        Self::AdUnderflow,
        Self::NoCalibration,
        Self::PowerRailLow,
        Self::TemperatureSensor,
        Self::Eeprom,
        Self::Watchdog,
        Self::Crc,
        Self::Ram,
        Self::SensorOffline,
        Self::SensorBlocked,
        Self::ObjectLoss,
    ];

    pub const fn mask(self) -> u16 {
        1 << self as u16
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AdOverflow => "A/D overflow",
            Self::AdUnderflow => "A/D underflow",
            Self::NoCalibration => "no calibration",
            Self::PowerRailLow => "power rail low",
            Self::TemperatureSensor => "temperature sensor failure",
            Self::Eeprom => "EEPROM failure",
            Self::Watchdog => "watchdog reset",
            Self::Crc => "CRC failure",
            Self::Ram => "RAM failure",
            Self::SensorOffline => "sensor offline",
            Self::SensorBlocked => "sensor blocked",
            Self::ObjectLoss => "object loss",
        };
        f.write_str(s)
    }
}

/// Set of active [`FaultCode`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FaultFlags(u16);

impl FaultFlags {
    pub const NONE: Self = Self(0);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & 0x0FFF)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, code: FaultCode) -> bool {
        self.0 & code.mask() != 0
    }

    pub fn insert(&mut self, code: FaultCode) {
        self.0 |= code.mask();
    }

    pub fn remove(&mut self, code: FaultCode) {
        self.0 &= !code.mask();
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The code shown to the operator.
    pub fn primary(self) -> Option<FaultCode> {
        if self.0 == 0 {
            return None;
        }
        FaultCode::ALL.get(self.0.trailing_zeros() as usize).copied()
    }

    pub fn iter(self) -> impl Iterator<Item = FaultCode> {
        FaultCode::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<FaultCode> for FaultFlags {
    fn from_iter<I: IntoIterator<Item = FaultCode>>(iter: I) -> Self {
        let mut flags = Self::NONE;
        for code in iter {
            flags.insert(code);
        }
        flags
    }
}

/// Latched per-sensor fault mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultSupervisor {
    faults: FaultFlags,
}

impl FaultSupervisor {
    /// Evaluate every code against the module's report.  Returns the
    /// previous mask if anything changed.
    pub fn evaluate(&mut self, sensor: usize, reported: FaultFlags) -> Option<FaultFlags> {
        let before = self.faults;
        for code in FaultCode::ALL {
            self.eval_fault(sensor, code, reported.contains(code));
        }
        (self.faults != before).then_some(before)
    }

    pub fn faults(&self) -> FaultFlags {
        self.faults
    }

    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }

    pub fn clear(&mut self) {
        self.faults = FaultFlags::NONE;
    }

    fn eval_fault(&mut self, sensor: usize, code: FaultCode, condition: bool) {
        if condition {
            if !self.faults.contains(code) {
                error!("sensor {}: FAULT SET: {code}", sensor + 1);
            }
            self.faults.insert(code);
        } else {
            if self.faults.contains(code) {
                info!("sensor {}: FAULT CLEARED: {code}", sensor + 1);
            }
            self.faults.remove(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_code_wins() {
        let flags: FaultFlags = [FaultCode::SensorOffline, FaultCode::Eeprom, FaultCode::ObjectLoss]
            .into_iter()
            .collect();
        assert_eq!(flags.primary(), Some(FaultCode::Eeprom));
        assert_eq!(FaultFlags::NONE.primary(), None);
    }

    #[test]
    fn supervisor_tracks_edges() {
        let mut sup = FaultSupervisor::default();
        let offline: FaultFlags = [FaultCode::SensorOffline].into_iter().collect();

        assert_eq!(sup.evaluate(0, offline), Some(FaultFlags::NONE));
        assert!(sup.has_faults());
        assert_eq!(sup.evaluate(0, offline), None);
        assert_eq!(sup.evaluate(0, FaultFlags::NONE), Some(offline));
        assert!(!sup.has_faults());
    }

    #[test]
    fn unknown_bits_are_masked() {
        let flags = FaultFlags::from_bits(0xF001);
        assert_eq!(flags.bits(), 0x0001);
        assert_eq!(flags.iter().collect::<Vec<_>>(), vec![FaultCode::AdOverflow]);
    }
}
