//! Decimated level history for on-screen graphs.
//!
//! Every `period` input samples are folded into one point; points land in a
//! fixed ring that always holds the most recent `capacity` of them.

use anyhow::{Context, Result};

use crate::dsp::utils::alloc_buffer;

/// Time span covered by one graph, in seconds.
pub const HISTORY_TIME: f32 = 4.0;
/// Points per graph.
pub const HISTORY_MESH_SIZE: usize = 560;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterMethod {
    AbsMaximum,
    Minimum,
}

pub struct HistoryGraph {
    data: Vec<f32>,
    head: usize,
    period: usize,
    method: MeterMethod,
    count: usize,
    current: f32,
}

impl Default for HistoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryGraph {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            head: 0,
            period: 1,
            method: MeterMethod::AbsMaximum,
            count: 0,
            current: 0.0,
        }
    }

    pub fn init(&mut self, capacity: usize) -> Result<()> {
        self.data = alloc_buffer(capacity).context("history points")?;
        self.head = 0;
        self.count = 0;
        Ok(())
    }

    pub fn set_period(&mut self, period: usize) {
        self.period = period.max(1);
        self.count = 0;
    }

    pub fn set_method(&mut self, method: MeterMethod) {
        self.method = method;
        self.count = 0;
    }

    pub fn process(&mut self, buf: &[f32]) {
        if self.data.is_empty() {
            return;
        }
        for &v in buf {
            let v = match self.method {
                MeterMethod::AbsMaximum => v.abs(),
                MeterMethod::Minimum => v,
            };
            self.current = if self.count == 0 {
                v
            } else {
                match self.method {
                    MeterMethod::AbsMaximum => self.current.max(v),
                    MeterMethod::Minimum => self.current.min(v),
                }
            };
            self.count += 1;

            if self.count >= self.period {
                self.data[self.head] = self.current;
                self.head = (self.head + 1) % self.data.len();
                self.count = 0;
            }
        }
    }

    /// Overwrites every point with `value` and drops the pending accumulation.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
        self.count = 0;
    }

    pub fn clear(&mut self) {
        self.fill(0.0);
    }

    /// Points from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let (newer, older) = self.data.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }
}
