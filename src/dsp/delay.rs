//! Fixed-capacity delay line.
//!
//! The ring is allocated once by [`Delay::init`]. Changing the depth only moves
//! the read tap, so samples already written stay valid across depth changes.

use anyhow::{Context, Result};

use crate::dsp::utils::alloc_buffer;

#[derive(Default)]
pub struct Delay {
    buffer: Vec<f32>,
    head: usize,
    delay: usize,
}

impl Delay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates room for a delay of up to `max_delay` samples.
    pub fn init(&mut self, max_delay: usize) -> Result<()> {
        self.buffer = alloc_buffer(max_delay + 1).context("delay line")?;
        self.head = 0;
        self.delay = 0;
        Ok(())
    }

    /// Largest depth accepted by [`Delay::set_delay`].
    pub fn max_delay(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Sets the depth, clamped to the allocated capacity.
    pub fn set_delay(&mut self, delay: usize) {
        self.delay = delay.min(self.max_delay());
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let size = self.buffer.len();
        self.buffer[self.head] = input;
        let tap = (self.head + size - self.delay) % size;
        let out = self.buffer[tap];
        self.head = (self.head + 1) % size;
        out
    }

    /// Writes `src` delayed into `dst`. Processes `min(dst.len(), src.len())` samples.
    pub fn process(&mut self, dst: &mut [f32], src: &[f32]) {
        if self.buffer.is_empty() {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
            return;
        }
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = self.tick(s);
        }
    }

    pub fn process_inplace(&mut self, buf: &mut [f32]) {
        if self.buffer.is_empty() {
            return;
        }
        for v in buf.iter_mut() {
            *v = self.tick(*v);
        }
    }
}
