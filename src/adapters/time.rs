//! Wall-clock adapter.
//!
//! Provides the minute of day for relay timer windows.  On the host the
//! system clock is read as UTC; a fixed minute can be pinned for
//! simulation and tests.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::ports::ClockPort;

/// Reject obviously unsynced time (before 2020-01-01).
const EPOCH_2020: u64 = 1_577_836_800;
const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Default)]
pub struct HostClock {
    fixed: Option<u16>,
}

impl HostClock {
    pub fn new() -> Self {
        Self { fixed: None }
    }

    /// Clock that always reports `minute` (wrapped into one day).
    pub fn fixed(minute: u16) -> Self {
        Self {
            fixed: Some(minute % 1440),
        }
    }

    pub fn set_minute(&mut self, minute: Option<u16>) {
        self.fixed = minute.map(|m| m % 1440);
    }
}

impl ClockPort for HostClock {
    fn minute_of_day(&self) -> Option<u16> {
        if self.fixed.is_some() {
            return self.fixed;
        }
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        if secs < EPOCH_2020 {
            return None;
        }
        Some(((secs % SECS_PER_DAY) / 60) as u16)
    }
}
