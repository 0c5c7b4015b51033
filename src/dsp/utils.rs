//! Small numeric helpers shared by the limiter DSP blocks.

use anyhow::{bail, Result};

/// Unity gain.
pub const GAIN_AMP_0_DB: f32 = 1.0;
/// Negative infinity in linear gain. Used as the "leg disabled" sentinel.
pub const GAIN_AMP_M_INF: f32 = 0.0;
/// Floor used before taking logarithms.
pub const DB_EPS: f32 = 1e-10;

#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}

#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

/// One-pole coefficient reaching 1 - 1/e of a step after `ms` milliseconds.
#[inline]
pub fn time_constant_coeff(ms: f32, sample_rate: f32) -> f32 {
    let samples = ms * 0.001 * sample_rate;
    if samples <= 0.0 {
        return 0.0;
    }
    (-1.0 / samples).exp()
}

#[inline]
pub fn millis_to_samples(sample_rate: usize, ms: f32) -> usize {
    (sample_rate as f32 * ms * 0.001).round().max(0.0) as usize
}

#[inline]
pub fn seconds_to_samples(sample_rate: usize, seconds: f32) -> usize {
    (sample_rate as f32 * seconds).round().max(0.0) as usize
}

/// Largest absolute value in `buf`, 0 for an empty slice.
pub fn abs_max(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
}

/// Smallest value in `buf`, `f32::INFINITY` for an empty slice.
pub fn min(buf: &[f32]) -> f32 {
    buf.iter().fold(f32::INFINITY, |acc, &v| acc.min(v))
}

/// Zeroed buffer of `len` samples. Fails instead of aborting when memory is short.
pub fn alloc_buffer(len: usize) -> Result<Vec<f32>> {
    let mut buf = Vec::new();
    if buf.try_reserve_exact(len).is_err() {
        bail!("cannot allocate a {len} sample buffer");
    }
    buf.resize(len, 0.0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_round_trip() {
        assert_relative_eq!(db_to_lin(-6.0), 0.501_187, epsilon = 1e-5);
        assert_relative_eq!(lin_to_db(db_to_lin(-12.0)), -12.0, epsilon = 1e-4);
    }

    #[test]
    fn test_time_conversions() {
        assert_eq!(millis_to_samples(48_000, 5.0), 240);
        assert_eq!(seconds_to_samples(48_000, 4.0 / 560.0), 343);
    }

    #[test]
    fn test_reductions() {
        assert_eq!(abs_max(&[0.1, -0.7, 0.3]), 0.7);
        assert_eq!(min(&[0.9, 0.4, 1.0]), 0.4);
        assert_eq!(abs_max(&[]), 0.0);
    }
}
