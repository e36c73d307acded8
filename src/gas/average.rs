//! Moving-average filter feeding the `Average` value source.
//!
//! Fifteen samples spread over the averaging window.  Sampling and
//! publishing run on separate countdowns: a sample is taken every
//! `window / 15` seconds, the mean is published once per window.

pub const AVERAGE_CAPACITY: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovingAverage {
    ring: [i16; AVERAGE_CAPACITY],
    sum: i32,
    next: usize,
    filled: usize,
    period_secs: u32,
    sample_interval: u32,
    sample_countdown: u32,
    publish_countdown: u32,
    published: Option<i16>,
}

impl MovingAverage {
    /// Filter for a window of `minutes`.  Zero disables averaging: the
    /// published value then follows the input directly.
    pub fn new(minutes: u8) -> Self {
        let period_secs = u32::from(minutes) * 60;
        Self {
            ring: [0; AVERAGE_CAPACITY],
            sum: 0,
            next: 0,
            filled: 0,
            period_secs,
            sample_interval: (period_secs / AVERAGE_CAPACITY as u32).max(1),
            sample_countdown: 0,
            publish_countdown: period_secs,
            published: None,
        }
    }

    /// Replace the oldest sample.  O(1).
    pub fn push(&mut self, value: i16) {
        let evicted = if self.filled == AVERAGE_CAPACITY {
            self.ring[self.next]
        } else {
            self.filled += 1;
            0
        };
        self.sum += i32::from(value) - i32::from(evicted);
        self.ring[self.next] = value;
        self.next = (self.next + 1) % AVERAGE_CAPACITY;
    }

    /// Mean over the filled part of the ring.
    pub fn mean(&self) -> Option<i16> {
        if self.filled == 0 {
            return None;
        }
        Some((self.sum / self.filled as i32) as i16)
    }

    /// Make the current mean the published value.
    pub fn publish(&mut self) {
        if let Some(mean) = self.mean() {
            self.published = Some(mean);
        }
    }

    /// Advance by `dt` seconds with the current input value.
    pub fn tick(&mut self, value: i16, dt: u16) {
        if self.period_secs == 0 {
            self.published = Some(value);
            return;
        }
        let dt = u32::from(dt);

        if self.sample_countdown == 0 {
            self.push(value);
            self.sample_countdown = self.sample_interval;
        }
        self.sample_countdown = self.sample_countdown.saturating_sub(dt);

        self.publish_countdown = self.publish_countdown.saturating_sub(dt);
        if self.publish_countdown == 0 {
            self.publish();
            self.publish_countdown = self.period_secs;
        }
    }

    /// Last published average; `None` until the first window elapsed.
    pub fn value(&self) -> Option<i16> {
        self.published
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn period_secs(&self) -> u32 {
        self.period_secs
    }
}
