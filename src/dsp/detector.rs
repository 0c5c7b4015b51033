//! Look-ahead gain detector
//!
//! Turns a detection signal into a gain curve that keeps the delayed signal
//! under the threshold. Runs at the oversampled rate.
//!
//! # Stages (per sample)
//! 1. **ALR**: an optional slow envelope pulls the level down before it hits
//!    the threshold.
//! 2. **Required gain**: soft knee around the threshold.
//! 3. **Look-ahead hold**: sliding minimum over the look-ahead window.
//! 4. **Smoothing**: attack/release shaped by the limiter mode.
//! 5. **Safety clamp**: never above the required gain of the sample that is
//!    leaving the look-ahead delay.
//!
//! # Latency
//! Equal to the look-ahead in samples at the detector rate, rounded down to a
//! whole number of look-ahead steps so it maps onto host-rate samples.

use anyhow::{bail, Result};

use crate::dsp::utils::{db_to_lin, lin_to_db, millis_to_samples, time_constant_coeff, DB_EPS};

/// Smoothing law of the gain curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Hermite,
    Exponential,
    Linear,
}

/// Attack/release proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Thin,
    Wide,
    Tail,
    Duck,
}

impl Shape {
    /// Multipliers applied to the attack and release times.
    fn scale(self) -> (f32, f32) {
        match self {
            Shape::Thin => (1.0, 1.0),
            Shape::Wide => (1.5, 1.5),
            Shape::Tail => (1.0, 2.0),
            Shape::Duck => (2.0, 1.0),
        }
    }
}

// Monotonic queue entry: absolute sample index and required gain.
#[derive(Clone, Copy, Default)]
struct Slot {
    pos: u64,
    gain: f32,
}

pub struct LookaheadDetector {
    // Allocation budget
    max_lookahead: usize,

    // Settings
    curve: Curve,
    shape: Shape,
    sample_rate: usize,
    lookahead_ms: f32,
    lookahead_step: usize,
    threshold: f32,
    attack_ms: f32,
    release_ms: f32,
    knee: f32,
    alr: bool,
    alr_attack_ms: f32,
    alr_release_ms: f32,
    dirty: bool,

    // Derived
    lookahead: usize,
    threshold_db: f32,
    knee_db: f32,
    atk_coeff: f32,
    rel_coeff: f32,
    atk_step: f32,
    rel_step: f32,
    alr_atk_coeff: f32,
    alr_rel_coeff: f32,

    // Window state
    queue: Vec<Slot>,
    q_head: usize,
    q_len: usize,
    required: Vec<f32>,
    req_head: usize,
    pos: u64,

    // Smoother state
    stage1: f32,
    env: f32,
    alr_env: f32,
}

impl Default for LookaheadDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LookaheadDetector {
    pub fn new() -> Self {
        Self {
            max_lookahead: 0,
            curve: Curve::Hermite,
            shape: Shape::Thin,
            sample_rate: 0,
            lookahead_ms: 0.0,
            lookahead_step: 1,
            threshold: 1.0,
            attack_ms: 5.0,
            release_ms: 5.0,
            knee: 1.0,
            alr: false,
            alr_attack_ms: 5.0,
            alr_release_ms: 50.0,
            dirty: true,
            lookahead: 0,
            threshold_db: 0.0,
            knee_db: 0.0,
            atk_coeff: 0.0,
            rel_coeff: 0.0,
            atk_step: 1.0,
            rel_step: 1.0,
            alr_atk_coeff: 0.0,
            alr_rel_coeff: 0.0,
            queue: Vec::new(),
            q_head: 0,
            q_len: 0,
            required: Vec::new(),
            req_head: 0,
            pos: 0,
            stage1: 1.0,
            env: 1.0,
            alr_env: 0.0,
        }
    }

    /// Allocates the look-ahead window for rates up to `max_rate` and
    /// look-ahead times up to `max_lookahead_ms`.
    pub fn init(&mut self, max_rate: usize, max_lookahead_ms: f32) -> Result<()> {
        let max_lookahead = millis_to_samples(max_rate, max_lookahead_ms);
        let size = max_lookahead + 1;

        let mut queue = Vec::new();
        let mut required = Vec::new();
        if queue.try_reserve_exact(size).is_err() || required.try_reserve_exact(size).is_err() {
            bail!("cannot allocate a {size} sample look-ahead window");
        }
        queue.resize(size, Slot::default());
        required.resize(size, 1.0);

        self.queue = queue;
        self.required = required;
        self.max_lookahead = max_lookahead;
        self.dirty = true;
        self.reset();
        Ok(())
    }

    pub fn set_mode(&mut self, curve: Curve, shape: Shape) {
        if self.curve != curve || self.shape != shape {
            self.curve = curve;
            self.shape = shape;
            self.dirty = true;
        }
    }

    /// Sets the detector rate. Clears the window and smoother state on change.
    pub fn set_sample_rate(&mut self, sample_rate: usize) {
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.dirty = true;
            self.reset();
        }
    }

    pub fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    pub fn set_lookahead(&mut self, ms: f32) {
        if self.lookahead_ms != ms {
            self.lookahead_ms = ms;
            self.dirty = true;
        }
    }

    /// Granularity of the look-ahead in detector samples, normally the
    /// oversampling factor.
    pub fn set_lookahead_step(&mut self, step: usize) {
        let step = step.max(1);
        if self.lookahead_step != step {
            self.lookahead_step = step;
            self.dirty = true;
        }
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        if self.threshold != threshold {
            self.threshold = threshold;
            self.dirty = true;
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_attack(&mut self, ms: f32) {
        if self.attack_ms != ms {
            self.attack_ms = ms;
            self.dirty = true;
        }
    }

    pub fn set_release(&mut self, ms: f32) {
        if self.release_ms != ms {
            self.release_ms = ms;
            self.dirty = true;
        }
    }

    /// Knee as a linear gain. The knee spans twice its distance from 0 dB,
    /// centred on the threshold. 1.0 is a hard knee.
    pub fn set_knee(&mut self, knee: f32) {
        if self.knee != knee {
            self.knee = knee;
            self.dirty = true;
        }
    }

    pub fn set_alr(&mut self, on: bool) {
        if self.alr != on {
            self.alr = on;
            self.alr_env = 0.0;
        }
    }

    pub fn set_alr_attack(&mut self, ms: f32) {
        if self.alr_attack_ms != ms {
            self.alr_attack_ms = ms;
            self.dirty = true;
        }
    }

    pub fn set_alr_release(&mut self, ms: f32) {
        if self.alr_release_ms != ms {
            self.alr_release_ms = ms;
            self.dirty = true;
        }
    }

    /// True when settings changed since the last [`Self::update_settings`].
    pub fn modified(&self) -> bool {
        self.dirty
    }

    /// Recomputes coefficients and the look-ahead length.
    pub fn update_settings(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        let sr = self.sample_rate as f32;
        let (atk_mul, rel_mul) = self.shape.scale();
        let attack_ms = self.attack_ms * atk_mul;
        let release_ms = self.release_ms * rel_mul;

        let step = self.lookahead_step;
        let lookahead =
            millis_to_samples(self.sample_rate, self.lookahead_ms).min(self.max_lookahead);
        self.lookahead = lookahead / step * step;
        self.threshold_db = lin_to_db(self.threshold);
        self.knee_db = 2.0 * lin_to_db(self.knee.max(DB_EPS)).abs();

        // Hermite runs two stages, each at half the time.
        let stage_div = if self.curve == Curve::Hermite { 2.0 } else { 1.0 };
        self.atk_coeff = time_constant_coeff(attack_ms / stage_div, sr);
        self.rel_coeff = time_constant_coeff(release_ms / stage_div, sr);
        self.atk_step = 1.0 / (attack_ms * 0.001 * sr).max(1.0);
        self.rel_step = 1.0 / (release_ms * 0.001 * sr).max(1.0);

        self.alr_atk_coeff = time_constant_coeff(self.alr_attack_ms, sr);
        self.alr_rel_coeff = time_constant_coeff(self.alr_release_ms, sr);
    }

    /// Latency in detector-rate samples.
    pub fn latency(&self) -> usize {
        self.lookahead
    }

    pub fn reset(&mut self) {
        self.q_head = 0;
        self.q_len = 0;
        self.required.fill(1.0);
        self.req_head = 0;
        self.pos = 0;
        self.stage1 = 1.0;
        self.env = 1.0;
        self.alr_env = 0.0;
    }

    #[inline]
    fn knee_gain(&self, level: f32) -> f32 {
        let over = lin_to_db(level) - self.threshold_db;
        let k = self.knee_db;
        if k <= 0.0 {
            return if over > 0.0 { db_to_lin(-over) } else { 1.0 };
        }
        if over <= -k * 0.5 {
            1.0
        } else if over >= k * 0.5 {
            db_to_lin(-over)
        } else {
            let x = over + k * 0.5;
            let y = (x * x) / (2.0 * k);
            db_to_lin(-y)
        }
    }

    #[inline]
    fn required_gain(&mut self, sample: f32) -> f32 {
        let level = sample.abs();
        if !self.alr {
            return self.knee_gain(level);
        }

        let coeff = if level > self.alr_env {
            self.alr_atk_coeff
        } else {
            self.alr_rel_coeff
        };
        self.alr_env = level + (self.alr_env - level) * coeff;

        let alr_gain = if self.alr_env > self.threshold {
            self.threshold / self.alr_env
        } else {
            1.0
        };
        alr_gain * self.knee_gain(level * alr_gain)
    }

    #[inline]
    fn window_min(&mut self, gain: f32) -> f32 {
        let cap = self.queue.len();
        let pos = self.pos;
        let window = self.lookahead as u64;

        // Drop entries older than the window.
        while self.q_len > 0 && self.queue[self.q_head].pos + window < pos {
            self.q_head = (self.q_head + 1) % cap;
            self.q_len -= 1;
        }

        // Drop entries that can never be the minimum again.
        while self.q_len > 0 {
            let back = (self.q_head + self.q_len - 1) % cap;
            if self.queue[back].gain >= gain {
                self.q_len -= 1;
            } else {
                break;
            }
        }
        let tail = (self.q_head + self.q_len) % cap;
        self.queue[tail] = Slot { pos, gain };
        self.q_len += 1;

        self.queue[self.q_head].gain
    }

    #[inline]
    fn smooth(&mut self, target: f32) -> f32 {
        let attacking = target < self.env;
        match self.curve {
            Curve::Exponential => {
                let c = if attacking { self.atk_coeff } else { self.rel_coeff };
                self.env = target + (self.env - target) * c;
            }
            Curve::Hermite => {
                let c = if attacking { self.atk_coeff } else { self.rel_coeff };
                self.stage1 = target + (self.stage1 - target) * c;
                self.env = self.stage1 + (self.env - self.stage1) * c;
            }
            Curve::Linear => {
                let step = if attacking { self.atk_step } else { self.rel_step };
                let delta = (target - self.env).clamp(-step, step);
                self.env += delta;
            }
        }
        self.env
    }

    /// Writes one gain value per `input` sample into `gain`.
    pub fn process(&mut self, gain: &mut [f32], input: &[f32]) {
        if self.queue.is_empty() {
            gain.fill(1.0);
            return;
        }

        let size = self.required.len();
        for (out, &x) in gain.iter_mut().zip(input) {
            let req = self.required_gain(x);

            self.required[self.req_head] = req;
            let leaving = self.required[(self.req_head + size - self.lookahead) % size];
            self.req_head = (self.req_head + 1) % size;

            let held = self.window_min(req);
            self.pos += 1;

            let smoothed = self.smooth(held);
            *out = smoothed.min(leaving);
        }
    }
}
