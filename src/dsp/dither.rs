//! TPDF dither for word-length reduction.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

pub struct Dither {
    prng: Pcg32,
    bits: usize,
    lsb: f32,
}

impl Dither {
    pub fn new(seed: u64) -> Self {
        Self {
            prng: Pcg32::seed_from_u64(seed),
            bits: 0,
            lsb: 0.0,
        }
    }

    /// Target word length. 0 disables dithering.
    pub fn set_bits(&mut self, bits: usize) {
        self.bits = bits;
        self.lsb = if bits == 0 {
            0.0
        } else {
            (2.0f32).powi(-(bits as i32 - 1))
        };
    }

    pub fn process(&mut self, buf: &mut [f32]) {
        if self.bits == 0 {
            return;
        }
        for v in buf.iter_mut() {
            let noise = self.prng.gen::<f32>() - self.prng.gen::<f32>();
            *v += noise * self.lsb;
        }
    }
}
