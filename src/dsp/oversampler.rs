//! Integer-factor oversampler.
//!
//! Upsampling interpolates linearly between consecutive host samples, which
//! costs one host sample of latency for any factor above 1. Downsampling keeps
//! phase 0 of every group; with filtering enabled a zero-phase 3-tap smoother
//! runs over the oversampled signal first so it adds no latency of its own.

/// Factors accepted by [`Oversampler::set_mode`].
pub const SUPPORTED_FACTORS: [usize; 6] = [1, 2, 3, 4, 6, 8];

pub struct Oversampler {
    sample_rate: usize,
    factor: usize,
    filtering: bool,

    pending_factor: usize,
    pending_filtering: bool,

    // Last host sample seen by `upsample`.
    up_prev: f32,
    // Last oversampled sample seen by `downsample`.
    down_prev: f32,
}

impl Default for Oversampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Oversampler {
    /// Highest latency, in host samples, any mode can report.
    pub const MAX_LATENCY: usize = 1;
    pub const MAX_FACTOR: usize = 8;

    pub fn new() -> Self {
        Self {
            sample_rate: 0,
            factor: 1,
            filtering: false,
            pending_factor: 1,
            pending_filtering: false,
            up_prev: 0.0,
            down_prev: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: usize) {
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.reset();
        }
    }

    /// Requests a new factor. Unsupported values round down to the nearest supported one.
    pub fn set_mode(&mut self, factor: usize) {
        self.pending_factor = SUPPORTED_FACTORS
            .iter()
            .copied()
            .filter(|&f| f <= factor.max(1))
            .last()
            .unwrap_or(1);
    }

    pub fn set_filtering(&mut self, filtering: bool) {
        self.pending_filtering = filtering;
    }

    /// True when a requested mode has not been applied yet.
    pub fn modified(&self) -> bool {
        self.pending_factor != self.factor || self.pending_filtering != self.filtering
    }

    /// Applies pending mode changes. State is reset when the factor changes.
    pub fn update_settings(&mut self) {
        if self.pending_factor != self.factor {
            self.factor = self.pending_factor;
            self.reset();
        }
        self.filtering = self.pending_filtering;
    }

    pub fn oversampling(&self) -> usize {
        self.factor
    }

    pub fn filtering(&self) -> bool {
        self.filtering
    }

    /// Latency in host samples.
    pub fn latency(&self) -> usize {
        if self.factor > 1 {
            1
        } else {
            0
        }
    }

    pub fn reset(&mut self) {
        self.up_prev = 0.0;
        self.down_prev = 0.0;
    }

    /// Writes `src.len() * factor` samples into `dst`.
    pub fn upsample(&mut self, dst: &mut [f32], src: &[f32]) {
        let factor = self.factor;
        if factor == 1 {
            dst[..src.len()].copy_from_slice(src);
            return;
        }

        let step = 1.0 / factor as f32;
        for (frame, &x) in dst.chunks_exact_mut(factor).zip(src) {
            let prev = self.up_prev;
            let delta = x - prev;
            for (k, out) in frame.iter_mut().enumerate() {
                *out = prev + delta * (k as f32 * step);
            }
            self.up_prev = x;
        }
    }

    /// Reduces `src` (`dst.len() * factor` samples) into `dst`.
    pub fn downsample(&mut self, dst: &mut [f32], src: &[f32]) {
        let factor = self.factor;
        if factor == 1 {
            let n = dst.len();
            dst.copy_from_slice(&src[..n]);
            return;
        }

        for (out, frame) in dst.iter_mut().zip(src.chunks_exact(factor)) {
            *out = if self.filtering {
                0.25 * self.down_prev + 0.5 * frame[0] + 0.25 * frame[1]
            } else {
                frame[0]
            };
            self.down_prev = frame[factor - 1];
        }
    }
}
