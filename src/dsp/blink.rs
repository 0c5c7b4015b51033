//! Peak-hold indicator for the deepest gain reduction.
//!
//! `blink_min` latches a value and restarts the hold; `process` counts the
//! hold down and reports the latched value until it expires.

use crate::dsp::utils::seconds_to_samples;

/// Hold time of a latched value, in seconds.
pub const BLINK_TIME: f32 = 0.1;

pub struct Blink {
    hold: usize,
    counter: usize,
    on_value: f32,
    off_value: f32,
}

impl Default for Blink {
    fn default() -> Self {
        Self::new()
    }
}

impl Blink {
    pub fn new() -> Self {
        Self {
            hold: 0,
            counter: 0,
            on_value: 1.0,
            off_value: 1.0,
        }
    }

    pub fn init(&mut self, sample_rate: usize) {
        self.hold = seconds_to_samples(sample_rate, BLINK_TIME);
        self.counter = 0;
    }

    pub fn set_default_off(&mut self, value: f32) {
        self.off_value = value;
    }

    /// Latches `value` if it is below the one already held.
    pub fn blink_min(&mut self, value: f32) {
        if self.counter == 0 || value < self.on_value {
            self.on_value = value;
        }
        self.counter = self.hold;
    }

    /// Advances the hold by `samples` and returns the current display value.
    pub fn process(&mut self, samples: usize) -> f32 {
        let value = if self.counter > 0 {
            self.on_value
        } else {
            self.off_value
        };
        self.counter = self.counter.saturating_sub(samples);
        value
    }
}
