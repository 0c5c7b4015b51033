//! Premix matrix
//!
//! Cross-feeds the three per-channel signal roles (main input, sidechain,
//! link) before detection. Each of the six legs carries a linear gain;
//! [`GAIN_AMP_M_INF`] switches a leg off.
//!
//! A destination with no contributing leg is returned as the caller's own
//! slice, so an idle matrix costs nothing. Otherwise the destination is
//! rebuilt in a scratch buffer from the incoming destination (or silence)
//! plus every contributing source. Legs always read the un-mixed sources.

use anyhow::{Context, Result};

use crate::dsp::utils::{alloc_buffer, GAIN_AMP_M_INF};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Sidechain,
    Link,
}

/// Linear gains of the six premix legs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PremixGains {
    pub in_to_sc: f32,
    pub in_to_link: f32,
    pub link_to_in: f32,
    pub link_to_sc: f32,
    pub sc_to_in: f32,
    pub sc_to_link: f32,
}

impl Default for PremixGains {
    fn default() -> Self {
        Self {
            in_to_sc: GAIN_AMP_M_INF,
            in_to_link: GAIN_AMP_M_INF,
            link_to_in: GAIN_AMP_M_INF,
            link_to_sc: GAIN_AMP_M_INF,
            sc_to_in: GAIN_AMP_M_INF,
            sc_to_link: GAIN_AMP_M_INF,
        }
    }
}

impl PremixGains {
    fn legs(&self) -> [Leg; 6] {
        [
            Leg::new(Role::Input, Role::Sidechain, self.in_to_sc),
            Leg::new(Role::Input, Role::Link, self.in_to_link),
            Leg::new(Role::Link, Role::Input, self.link_to_in),
            Leg::new(Role::Link, Role::Sidechain, self.link_to_sc),
            Leg::new(Role::Sidechain, Role::Input, self.sc_to_in),
            Leg::new(Role::Sidechain, Role::Link, self.sc_to_link),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
struct Leg {
    from: Role,
    to: Role,
    gain: f32,
}

impl Leg {
    const fn new(from: Role, to: Role, gain: f32) -> Self {
        Self { from, to, gain }
    }

    fn touches(&self, role: Role) -> bool {
        self.from == role || self.to == role
    }
}

/// The three signal roles of one channel for one block.
#[derive(Debug, Clone, Copy)]
pub struct PremixSources<'a> {
    pub input: &'a [f32],
    pub sidechain: Option<&'a [f32]>,
    pub link: Option<&'a [f32]>,
}

impl<'a> PremixSources<'a> {
    pub fn get(&self, role: Role) -> Option<&'a [f32]> {
        match role {
            Role::Input => Some(self.input),
            Role::Sidechain => self.sidechain,
            Role::Link => self.link,
        }
    }
}

/// Per-channel buffers holding rebuilt destinations.
pub struct PremixScratch {
    input: Vec<f32>,
    sidechain: Vec<f32>,
    link: Vec<f32>,
}

impl PremixScratch {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            input: alloc_buffer(capacity).context("premix input scratch")?,
            sidechain: alloc_buffer(capacity).context("premix sidechain scratch")?,
            link: alloc_buffer(capacity).context("premix link scratch")?,
        })
    }
}

pub struct Premix {
    legs: [Leg; 6],
    active: usize,
    sidechain: bool,
}

impl Premix {
    /// `sidechain` tells whether the host variant has a sidechain input at all.
    pub fn new(sidechain: bool) -> Self {
        Self {
            legs: PremixGains::default().legs(),
            active: 0,
            sidechain,
        }
    }

    /// Rebuilds the active leg table from `gains`.
    pub fn update(&mut self, gains: &PremixGains) {
        self.active = 0;
        for leg in gains.legs() {
            if leg.gain <= GAIN_AMP_M_INF {
                continue;
            }
            if !self.sidechain && leg.touches(Role::Sidechain) {
                continue;
            }
            self.legs[self.active] = leg;
            self.active += 1;
        }
    }

    pub fn active_legs(&self) -> usize {
        self.active
    }

    /// Applies the matrix to the first `samples` samples of `sources`.
    pub fn process<'a>(
        &self,
        sources: PremixSources<'a>,
        scratch: &'a mut PremixScratch,
        samples: usize,
    ) -> PremixSources<'a> {
        if self.active == 0 {
            return sources;
        }

        let PremixScratch {
            input,
            sidechain,
            link,
        } = scratch;

        PremixSources {
            input: self
                .mix(Role::Input, &sources, &mut input[..samples])
                .unwrap_or(sources.input),
            sidechain: self
                .mix(Role::Sidechain, &sources, &mut sidechain[..samples])
                .or(sources.sidechain),
            link: self
                .mix(Role::Link, &sources, &mut link[..samples])
                .or(sources.link),
        }
    }

    /// Rebuilds `to` in `buf`, or returns `None` if no leg contributes to it.
    fn mix<'a>(
        &self,
        to: Role,
        sources: &PremixSources<'a>,
        buf: &'a mut [f32],
    ) -> Option<&'a [f32]> {
        let mut contributions = self.legs[..self.active]
            .iter()
            .filter(|leg| leg.to == to)
            .filter_map(|leg| sources.get(leg.from).map(|src| (src, leg.gain)))
            .peekable();
        contributions.peek()?;

        match sources.get(to) {
            Some(dst) => buf.copy_from_slice(&dst[..buf.len()]),
            None => buf.fill(0.0),
        }
        for (src, gain) in contributions {
            for (d, &s) in buf.iter_mut().zip(src) {
                *d = s.mul_add(gain, *d);
            }
        }
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::ptr;

    fn scratch() -> PremixScratch {
        PremixScratch::new(16).unwrap()
    }

    #[test]
    fn test_idle_matrix_aliases_sources() {
        let input = [0.1f32; 4];
        let sc = [0.2f32; 4];
        let link = [0.3f32; 4];
        let mut premix = Premix::new(true);
        premix.update(&PremixGains::default());

        let mut s = scratch();
        let src = PremixSources {
            input: &input,
            sidechain: Some(&sc),
            link: Some(&link),
        };
        let out = premix.process(src, &mut s, 4);
        assert!(ptr::eq(out.input, &input[..]));
        assert!(ptr::eq(out.sidechain.unwrap(), &sc[..]));
        assert!(ptr::eq(out.link.unwrap(), &link[..]));
    }

    #[test]
    fn test_legs_read_unmixed_sources() {
        let input = [1.0f32; 4];
        let sc = [0.25f32; 4];
        let mut premix = Premix::new(true);
        premix.update(&PremixGains {
            in_to_sc: 0.5,
            sc_to_in: 0.5,
            ..PremixGains::default()
        });

        let mut s = scratch();
        let src = PremixSources {
            input: &input,
            sidechain: Some(&sc),
            link: None,
        };
        let out = premix.process(src, &mut s, 4);
        for &v in out.sidechain.unwrap() {
            assert_relative_eq!(v, 0.75);
        }
        // Reads the incoming sidechain, not the one rebuilt above.
        for &v in out.input {
            assert_relative_eq!(v, 1.125);
        }
        assert!(out.link.is_none());
    }

    #[test]
    fn test_absent_source_contributes_nothing() {
        let input = [0.5f32; 4];
        let mut premix = Premix::new(true);
        premix.update(&PremixGains {
            link_to_in: 1.0,
            ..PremixGains::default()
        });

        let mut s = scratch();
        let src = PremixSources {
            input: &input,
            sidechain: None,
            link: None,
        };
        let out = premix.process(src, &mut s, 4);
        assert!(ptr::eq(out.input, &input[..]));
    }

    #[test]
    fn test_absent_destination_starts_silent() {
        let input = [0.5f32; 4];
        let mut premix = Premix::new(false);
        premix.update(&PremixGains {
            in_to_link: 0.5,
            ..PremixGains::default()
        });

        let mut s = scratch();
        let src = PremixSources {
            input: &input,
            sidechain: None,
            link: None,
        };
        let out = premix.process(src, &mut s, 4);
        assert_eq!(out.link.unwrap(), &[0.25f32; 4][..]);
    }

    #[test]
    fn test_sidechain_legs_dropped_without_sidechain() {
        let mut premix = Premix::new(false);
        premix.update(&PremixGains {
            in_to_sc: 1.0,
            sc_to_in: 1.0,
            link_to_sc: 1.0,
            sc_to_link: 1.0,
            ..PremixGains::default()
        });
        assert_eq!(premix.active_legs(), 0);
    }
}
