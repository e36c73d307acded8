//! Time-of-day relay timers.
//!
//! Each of the four timers holds a `[on_time, off_time)` window in
//! minutes since midnight.  A window with `on_time > off_time` wraps
//! around midnight (e.g. 22:00–06:00).

use crate::config::RelayTimer;
use crate::relay_set::RelaySet;

/// Window check for one timer.
///
/// Negative times disable the timer; `on_time == off_time` is an empty
/// window.
pub fn window_contains(timer: &RelayTimer, minute: u16) -> bool {
    if timer.on_time < 0 || timer.off_time < 0 || timer.on_time == timer.off_time {
        return false;
    }
    let minute = minute as i16;
    if timer.on_time < timer.off_time {
        // e.g. 08:00..17:00
        minute >= timer.on_time && minute < timer.off_time
    } else {
        // e.g. 22:00..06:00, wraps around midnight
        minute >= timer.on_time || minute < timer.off_time
    }
}

/// Relays demanded by the timers at `minute`.  Nothing while the clock
/// is unset.
pub fn timer_demand(timers: &[RelayTimer], minute: Option<u16>) -> RelaySet {
    let mut demand = RelaySet::EMPTY;
    let Some(minute) = minute else {
        return demand;
    };
    for timer in timers.iter().filter(|t| window_contains(t, minute)) {
        demand.union_with(&timer.relays);
    }
    demand
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(on: i16, off: i16) -> RelayTimer {
        RelayTimer {
            mode: 0,
            on_time: on,
            off_time: off,
            relays: RelaySet::single(5),
        }
    }

    #[test]
    fn daytime_window() {
        let t = timer(8 * 60, 17 * 60);
        assert!(!window_contains(&t, 8 * 60 - 1));
        assert!(window_contains(&t, 8 * 60));
        assert!(window_contains(&t, 17 * 60 - 1));
        assert!(!window_contains(&t, 17 * 60));
    }

    #[test]
    fn overnight_window_wraps() {
        let t = timer(22 * 60, 6 * 60);
        assert!(window_contains(&t, 23 * 60));
        assert!(window_contains(&t, 0));
        assert!(window_contains(&t, 5 * 60 + 59));
        assert!(!window_contains(&t, 12 * 60));
    }

    #[test]
    fn disabled_and_empty_windows_never_fire() {
        assert!(!window_contains(&RelayTimer::DISABLED, 0));
        assert!(!window_contains(&timer(-1, 600), 700));
        assert!(!window_contains(&timer(600, 600), 600));
    }

    #[test]
    fn demand_requires_clock() {
        let timers = [timer(0, 1439)];
        assert!(timer_demand(&timers, None).is_empty());
        assert!(timer_demand(&timers, Some(100)).contains(5));
    }
}
