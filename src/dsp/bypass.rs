//! Click-free bypass: a linear cross-fade between the dry and processed signals.

/// Cross-fade time, in seconds.
pub const BYPASS_TIME: f32 = 0.005;

pub struct Bypass {
    step: f32,
    amount: f32,
    target: f32,
}

impl Default for Bypass {
    fn default() -> Self {
        Self::new()
    }
}

impl Bypass {
    pub fn new() -> Self {
        Self {
            step: 1.0,
            amount: 1.0,
            target: 1.0,
        }
    }

    pub fn init(&mut self, sample_rate: usize) {
        self.step = 1.0 / (sample_rate as f32 * BYPASS_TIME).max(1.0);
    }

    /// Returns true when the target state changed.
    pub fn set_bypass(&mut self, bypass: bool) -> bool {
        let target = if bypass { 0.0 } else { 1.0 };
        let changed = self.target != target;
        self.target = target;
        changed
    }

    /// Jumps to the target without fading.
    pub fn snap(&mut self) {
        self.amount = self.target;
    }

    pub fn process(&mut self, dst: &mut [f32], dry: &[f32], wet: &[f32]) {
        if self.amount == self.target {
            let src = if self.target >= 1.0 { wet } else { dry };
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
            return;
        }

        let step = if self.target > self.amount {
            self.step
        } else {
            -self.step
        };
        for ((d, &x), &y) in dst.iter_mut().zip(dry).zip(wet) {
            self.amount = (self.amount + step).clamp(0.0, 1.0);
            *d = x + (y - x) * self.amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_passes_wet() {
        let mut b = Bypass::new();
        b.init(48_000);
        let mut dst = [0.0; 3];
        b.process(&mut dst, &[1.0; 3], &[0.5; 3]);
        assert_eq!(dst, [0.5; 3]);
    }

    #[test]
    fn test_fades_to_dry() {
        let mut b = Bypass::new();
        b.init(1000);
        assert!(b.set_bypass(true));
        let mut dst = [0.0; 8];
        b.process(&mut dst, &[1.0; 8], &[0.0; 8]);
        // 5 samples of fade at 1 kHz.
        assert!(dst[0] > 0.0 && dst[0] < 1.0);
        assert!(dst.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(dst[7], 1.0);
        assert!(!b.set_bypass(true));
    }

    #[test]
    fn test_snap_skips_fade() {
        let mut b = Bypass::new();
        b.init(48_000);
        b.set_bypass(true);
        b.snap();
        let mut dst = [0.0; 2];
        b.process(&mut dst, &[0.25; 2], &[0.75; 2]);
        assert_eq!(dst, [0.25; 2]);
    }
}
