//! Channel pipeline orchestrator
//!
//! Owns every per-channel resource and drives one host block through the
//! limiter:
//!
//! ```text
//! premix -> input gain -> upsample ----------------> processed delay --+
//!             |                                                        |
//!             +-> detector source -> upsample -> preamp -> detector    |
//!                                                   |                  |
//!                                    stereo link <--+                  |
//!                                        |                             v
//!                                        +----> gain * output gain -> downsample
//!                                                                      |
//!                      host input -> dry delay -> bypass fade <- dither
//! ```
//!
//! # Latency
//! `detector latency / oversampling + oversampler latency` host samples. Every
//! settings update re-aligns the dry delay of every channel to that value.
//!
//! # Real-time contract
//! All memory is reserved in [`Limiter::new`]. `update_settings`, `process`
//! and `reset` never allocate.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::dsp::blink::Blink;
use crate::dsp::bypass::Bypass;
use crate::dsp::delay::Delay;
use crate::dsp::detector::LookaheadDetector;
use crate::dsp::dither::Dither;
use crate::dsp::history::{HistoryGraph, MeterMethod, HISTORY_MESH_SIZE, HISTORY_TIME};
use crate::dsp::oversampler::Oversampler;
use crate::dsp::stereo_link::link_gains;
use crate::dsp::utils::{
    abs_max, alloc_buffer, millis_to_samples, min, seconds_to_samples, DB_EPS, GAIN_AMP_0_DB,
};
use crate::meters::{GraphKind, Meters};
use crate::premix::{Premix, PremixScratch, PremixSources};
use crate::rt_log;
use crate::settings::{LimiterSettings, SidechainMode, LOOKAHEAD_MAX_MS, OVERSAMPLING_MAX};

/// Oversampled samples handled per internal chunk.
pub const LIMIT_BUFSIZE: usize = 8192;
/// Host chunk lengths are rounded down to a multiple of this.
pub const LIMIT_BUFMULTIPLE: usize = 16;
/// Highest host sample rate the buffers are sized for.
pub const MAX_SAMPLE_RATE: usize = 192_000;

// Look-ahead room with headroom over the largest setting.
const LOOKAHEAD_BUDGET_MS: f32 = LOOKAHEAD_MAX_MS + 1.0;
const DITHER_SEED: u64 = 0x4c69_6d69;

/// Shape of the host variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// 1 (mono) or 2 (stereo).
    pub channels: usize,
    /// Whether the variant has an external sidechain input.
    pub sidechain: bool,
}

/// One channel's host buffers for one call.
///
/// `main` is processed in place: it holds the input on entry and the output
/// on return.
pub struct ChannelIo<'a> {
    pub main: &'a mut [f32],
    pub sidechain: Option<&'a [f32]>,
    pub link: Option<&'a [f32]>,
}

struct Channel {
    over: Oversampler,
    sc_over: Oversampler,
    detector: LookaheadDetector,
    data_delay: Delay,
    dry_delay: Delay,
    bypass: Bypass,
    dither: Dither,
    blink: Blink,
    graphs: [HistoryGraph; GraphKind::COUNT],
    premix: PremixScratch,

    // Oversampled rate
    data: Vec<f32>,
    sc: Vec<f32>,
    gain: Vec<f32>,

    // Host rate
    out: Vec<f32>,
    dry: Vec<f32>,

    // Peaks of the current call
    in_peak: f32,
    out_peak: f32,
    sc_peak: f32,
}

impl Channel {
    fn new(index: usize) -> Result<Self> {
        let max_real_rate = MAX_SAMPLE_RATE * OVERSAMPLING_MAX;

        let mut detector = LookaheadDetector::new();
        detector
            .init(max_real_rate, LOOKAHEAD_BUDGET_MS)
            .context("gain detector")?;

        let mut data_delay = Delay::new();
        data_delay
            .init(millis_to_samples(max_real_rate, LOOKAHEAD_BUDGET_MS))
            .context("processed signal delay")?;

        let mut dry_delay = Delay::new();
        dry_delay
            .init(millis_to_samples(MAX_SAMPLE_RATE, LOOKAHEAD_BUDGET_MS) + Oversampler::MAX_LATENCY)
            .context("dry signal delay")?;

        let mut graphs: [HistoryGraph; GraphKind::COUNT] = Default::default();
        for graph in graphs.iter_mut() {
            graph.init(HISTORY_MESH_SIZE)?;
        }
        graphs[GraphKind::Gain.index()].set_method(MeterMethod::Minimum);

        let mut channel = Self {
            over: Oversampler::new(),
            sc_over: Oversampler::new(),
            detector,
            data_delay,
            dry_delay,
            bypass: Bypass::new(),
            dither: Dither::new(DITHER_SEED + index as u64),
            blink: Blink::new(),
            graphs,
            premix: PremixScratch::new(LIMIT_BUFSIZE)?,
            data: alloc_buffer(LIMIT_BUFSIZE)?,
            sc: alloc_buffer(LIMIT_BUFSIZE)?,
            gain: alloc_buffer(LIMIT_BUFSIZE)?,
            out: alloc_buffer(LIMIT_BUFSIZE)?,
            dry: alloc_buffer(LIMIT_BUFSIZE)?,
            in_peak: 0.0,
            out_peak: 0.0,
            sc_peak: 0.0,
        };
        channel.reset_graphs();
        Ok(channel)
    }

    fn reset_graphs(&mut self) {
        for kind in GraphKind::ALL {
            let graph = &mut self.graphs[kind.index()];
            if kind == GraphKind::Gain {
                graph.fill(GAIN_AMP_0_DB);
            } else {
                graph.clear();
            }
        }
    }

    fn graph(&mut self, kind: GraphKind) -> &mut HistoryGraph {
        &mut self.graphs[kind.index()]
    }
}

pub struct Limiter {
    config: LimiterConfig,
    channels: Vec<Channel>,
    premix: Premix,
    silence: Vec<f32>,
    meters: Arc<Meters>,

    settings: LimiterSettings,
    sample_rate: usize,
    latency: usize,

    // Derived from settings
    out_gain: f32,
    stereo_link: f32,
    sc_mode: SidechainMode,
}

impl Limiter {
    /// Reserves every buffer the limiter will ever use.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        if !(1..=2).contains(&config.channels) {
            bail!("unsupported channel count {}", config.channels);
        }

        let mut channels = Vec::new();
        if channels.try_reserve_exact(config.channels).is_err() {
            bail!("cannot allocate {} channels", config.channels);
        }
        for i in 0..config.channels {
            channels.push(Channel::new(i).with_context(|| format!("channel {i}"))?);
        }

        Ok(Self {
            config,
            channels,
            premix: Premix::new(config.sidechain),
            silence: alloc_buffer(LIMIT_BUFSIZE)?,
            meters: Arc::new(Meters::new(config.channels, HISTORY_MESH_SIZE)),
            settings: LimiterSettings::default(),
            sample_rate: 0,
            latency: 0,
            out_gain: GAIN_AMP_0_DB,
            stereo_link: 0.0,
            sc_mode: SidechainMode::Internal,
        })
    }

    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    pub fn meters(&self) -> Arc<Meters> {
        self.meters.clone()
    }

    /// Total latency in host samples.
    pub fn latency(&self) -> usize {
        self.latency
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    /// Requests one history snapshot for a freshly opened view.
    pub fn ui_activated(&self) {
        self.meters.request_sync();
    }

    /// Re-targets every rate-dependent component, then re-applies the current settings.
    pub fn update_sample_rate(&mut self, sample_rate: f32) -> Result<()> {
        let sr = sample_rate.round() as usize;
        if sr == 0 || sr > MAX_SAMPLE_RATE {
            bail!("unsupported sample rate {sample_rate} Hz");
        }
        if sr == self.sample_rate {
            return Ok(());
        }
        log::info!("limiter sample rate {} -> {} Hz", self.sample_rate, sr);
        self.sample_rate = sr;

        for ch in self.channels.iter_mut() {
            ch.bypass.init(sr);
            ch.blink.init(sr);
            ch.blink.set_default_off(GAIN_AMP_0_DB);
            ch.over.set_sample_rate(sr);
            ch.sc_over.set_sample_rate(sr);
            // Old samples belong to another rate.
            ch.dry_delay.clear();
        }

        let settings = self.settings;
        self.update_settings(&settings);
        Ok(())
    }

    /// Applies a settings snapshot and re-aligns latency.
    pub fn update_settings(&mut self, settings: &LimiterSettings) {
        self.settings = *settings;
        let s = self.settings;

        self.premix.update(&s.premix);
        self.sc_mode = s.sc_mode;
        self.stereo_link = if self.channels.len() == 2 {
            s.stereo_link.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let factor = s.oversampling.factor();
        let real_rate = self.sample_rate * factor;
        let period = seconds_to_samples(real_rate, HISTORY_TIME / HISTORY_MESH_SIZE as f32);

        for ch in self.channels.iter_mut() {
            ch.over.set_mode(factor);
            ch.over.set_filtering(s.oversampling.filtering());
            if ch.over.modified() {
                ch.over.update_settings();
            }
            ch.sc_over.set_mode(factor);
            ch.sc_over.set_filtering(false);
            if ch.sc_over.modified() {
                ch.sc_over.update_settings();
            }

            ch.bypass.set_bypass(s.bypass);
            ch.dither.set_bits(s.dithering.bits());

            let rate_changed = ch.detector.sample_rate() != real_rate;
            ch.detector.set_mode(s.mode.curve(), s.mode.shape());
            ch.detector.set_sample_rate(real_rate);
            ch.detector.set_lookahead(s.lookahead);
            ch.detector.set_lookahead_step(factor);
            ch.detector.set_threshold(s.threshold);
            ch.detector.set_attack(s.attack);
            ch.detector.set_release(s.release);
            ch.detector.set_knee(s.knee);
            ch.detector.set_alr(s.alr);
            ch.detector.set_alr_attack(s.alr_attack);
            ch.detector.set_alr_release(s.alr_release);
            if ch.detector.modified() {
                ch.detector.update_settings();
            }

            if rate_changed {
                ch.data_delay.clear();
                for graph in ch.graphs.iter_mut() {
                    graph.set_period(period);
                }
                ch.reset_graphs();
            }
            ch.data_delay.set_delay(ch.detector.latency());
        }

        let threshold = self.channels.first().map_or(s.threshold, |ch| ch.detector.threshold());
        self.out_gain = if s.boost {
            s.output_gain / threshold.max(DB_EPS)
        } else {
            s.output_gain
        };

        self.sync_latency();
    }

    fn sync_latency(&mut self) {
        let Some(first) = self.channels.first() else {
            return;
        };
        let latency =
            first.detector.latency() / first.sc_over.oversampling() + first.sc_over.latency();

        for ch in self.channels.iter_mut() {
            ch.dry_delay.set_delay(latency);
        }
        if latency != self.latency {
            rt_log!("limiter latency {} -> {} samples", self.latency, latency);
            self.latency = latency;
        }
    }

    /// Clears all signal history without touching settings.
    pub fn reset(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.over.reset();
            ch.sc_over.reset();
            ch.detector.reset();
            ch.data_delay.clear();
            ch.dry_delay.clear();
            ch.bypass.snap();
            ch.reset_graphs();
        }
        self.meters.reset();
    }

    /// Processes `samples` samples of every channel in `io` in place.
    ///
    /// `io` must hold one entry per configured channel; otherwise the block is
    /// silenced. A sidechain or link slice shorter than the block counts as absent.
    pub fn process(&mut self, io: &mut [ChannelIo], samples: usize) {
        if io.len() != self.channels.len() {
            rt_log!(
                "limiter got {} channels, expected {}",
                io.len(),
                self.channels.len()
            );
            for c in io.iter_mut() {
                c.main.fill(0.0);
            }
            return;
        }

        let samples = io.iter().fold(samples, |n, c| n.min(c.main.len()));
        for c in io.iter_mut() {
            if c.sidechain.is_some_and(|s| s.len() < samples) {
                c.sidechain = None;
            }
            if c.link.is_some_and(|s| s.len() < samples) {
                c.link = None;
            }
        }

        for ch in self.channels.iter_mut() {
            ch.in_peak = 0.0;
            ch.out_peak = 0.0;
            ch.sc_peak = 0.0;
        }

        let factor = self.channels[0].over.oversampling();
        let chunk = (LIMIT_BUFSIZE / factor) & !(LIMIT_BUFMULTIPLE - 1);

        let mut offset = 0;
        while offset < samples {
            let n = (samples - offset).min(chunk);
            self.process_chunk(io, offset, n, factor);
            offset += n;
        }

        self.publish(samples);
    }

    fn process_chunk(&mut self, io: &mut [ChannelIo], offset: usize, n: usize, factor: usize) {
        let nf = n * factor;
        let range = offset..offset + n;
        let s = self.settings;

        // Detection
        for (ch, c) in self.channels.iter_mut().zip(io.iter()) {
            let sources = PremixSources {
                input: &c.main[range.clone()],
                sidechain: c.sidechain.map(|b| &b[range.clone()]),
                link: c.link.map(|b| &b[range.clone()]),
            };
            let mixed = self.premix.process(sources, &mut ch.premix, n);

            for (o, &x) in ch.out[..n].iter_mut().zip(mixed.input) {
                *o = x * s.input_gain;
            }
            ch.over.upsample(&mut ch.data[..nf], &ch.out[..n]);

            let source = match self.sc_mode {
                SidechainMode::Internal => &ch.out[..n],
                SidechainMode::External => mixed.sidechain.unwrap_or(&self.silence[..n]),
                SidechainMode::Link => mixed.link.unwrap_or(&self.silence[..n]),
            };
            ch.sc_over.upsample(&mut ch.sc[..nf], source);
            for v in ch.sc[..nf].iter_mut() {
                *v *= s.sc_preamp;
            }

            ch.in_peak = ch.in_peak.max(abs_max(&ch.data[..nf]));
            ch.sc_peak = ch.sc_peak.max(abs_max(&ch.sc[..nf]));
            ch.graphs[GraphKind::Input.index()].process(&ch.data[..nf]);
            ch.graphs[GraphKind::Sidechain.index()].process(&ch.sc[..nf]);

            ch.detector.process(&mut ch.gain[..nf], &ch.sc[..nf]);
            ch.data_delay.process_inplace(&mut ch.data[..nf]);
        }

        if let [left, right] = self.channels.as_mut_slice() {
            link_gains(&mut left.gain[..nf], &mut right.gain[..nf], self.stereo_link);
        }

        // Rendering
        let out_gain = self.out_gain;
        for (ch, c) in self.channels.iter_mut().zip(io.iter_mut()) {
            for (d, &g) in ch.data[..nf].iter_mut().zip(&ch.gain[..nf]) {
                *d *= g * out_gain;
            }

            ch.out_peak = ch.out_peak.max(abs_max(&ch.data[..nf]));
            ch.graphs[GraphKind::Output.index()].process(&ch.data[..nf]);
            ch.graphs[GraphKind::Gain.index()].process(&ch.gain[..nf]);

            let deepest = min(&ch.gain[..nf]);
            if deepest < GAIN_AMP_0_DB {
                ch.blink.blink_min(deepest);
            }

            ch.over.downsample(&mut ch.out[..n], &ch.data[..nf]);
            ch.dither.process(&mut ch.out[..n]);

            let main = &mut c.main[range.clone()];
            ch.dry_delay.process(&mut ch.dry[..n], main);
            ch.bypass.process(main, &ch.dry[..n], &ch.out[..n]);
        }
    }

    // Meters once per call, history subject to pause/clear/sync.
    fn publish(&mut self, samples: usize) {
        for (i, ch) in self.channels.iter_mut().enumerate() {
            if let Some(m) = self.meters.channel(i) {
                m.set_level(GraphKind::Input, ch.in_peak);
                m.set_level(GraphKind::Output, ch.out_peak);
                m.set_level(GraphKind::Sidechain, ch.sc_peak);
                m.set_level(GraphKind::Gain, ch.blink.process(samples));
            }
        }

        let sync = self.meters.take_sync_request();
        let s = self.settings;
        if s.pause && !s.clear && !sync {
            return;
        }

        for (i, ch) in self.channels.iter_mut().enumerate() {
            if s.clear {
                for graph in ch.graphs.iter_mut() {
                    graph.clear();
                }
            }
            let Some(m) = self.meters.channel(i) else {
                continue;
            };
            for kind in GraphKind::ALL {
                m.mesh(kind).publish(ch.graph(kind).iter());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Dithering, LimiterMode, Oversampling};
    use crate::premix::PremixGains;
    use approx::assert_relative_eq;
    use std::f32::consts::TAU;

    const SR: f32 = 48_000.0;

    fn limiter_at(
        sample_rate: f32,
        channels: usize,
        sidechain: bool,
        settings: LimiterSettings,
    ) -> Limiter {
        let mut l = Limiter::new(LimiterConfig {
            channels,
            sidechain,
        })
        .unwrap();
        l.update_sample_rate(sample_rate).unwrap();
        l.update_settings(&settings);
        l
    }

    fn limiter(channels: usize, sidechain: bool, settings: LimiterSettings) -> Limiter {
        limiter_at(SR, channels, sidechain, settings)
    }

    fn sine(len: usize, freq: f32, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (TAU * freq * i as f32 / SR).sin())
            .collect()
    }

    fn run_mono(l: &mut Limiter, input: &[f32], sidechain: Option<&[f32]>) -> Vec<f32> {
        let mut buf = input.to_vec();
        let n = buf.len();
        let mut io = [ChannelIo {
            main: &mut buf,
            sidechain,
            link: None,
        }];
        l.process(&mut io, n);
        buf
    }

    fn run_stereo(l: &mut Limiter, left: &mut [f32], right: &mut [f32]) {
        let n = left.len();
        let mut io = [
            ChannelIo {
                main: left,
                sidechain: None,
                link: None,
            },
            ChannelIo {
                main: right,
                sidechain: None,
                link: None,
            },
        ];
        l.process(&mut io, n);
    }

    fn gain_history(l: &Limiter, channel: usize) -> Vec<f32> {
        l.channels[channel].graphs[GraphKind::Gain.index()]
            .iter()
            .collect()
    }

    #[test]
    fn test_rejects_unsupported_channel_counts() {
        for channels in [0, 3] {
            let config = LimiterConfig {
                channels,
                sidechain: false,
            };
            assert!(Limiter::new(config).is_err());
        }
    }

    #[test]
    fn test_rejects_unsupported_sample_rate() {
        let mut l = Limiter::new(LimiterConfig {
            channels: 1,
            sidechain: false,
        })
        .unwrap();
        assert!(l.update_sample_rate(0.0).is_err());
        assert!(l.update_sample_rate(384_000.0).is_err());
    }

    #[test]
    fn test_latency_tracks_detector_and_oversampler() {
        let mut l = limiter(
            2,
            false,
            LimiterSettings {
                oversampling: Oversampling::Half4x,
                lookahead: 5.0,
                ..LimiterSettings::default()
            },
        );
        // 5 ms at 192 kHz is 960 detector samples: 960 / 4 + 1.
        assert_eq!(l.latency(), 241);
        assert!(l.channels.iter().all(|ch| ch.dry_delay.delay() == 241));

        l.update_settings(&LimiterSettings {
            oversampling: Oversampling::None,
            lookahead: 2.0,
            ..LimiterSettings::default()
        });
        assert_eq!(l.latency(), 96);
        assert!(l.channels.iter().all(|ch| ch.dry_delay.delay() == 96));
    }

    #[test]
    fn test_quiet_signal_passes_scaled_and_delayed() {
        let settings = LimiterSettings {
            oversampling: Oversampling::Half4x,
            input_gain: 0.5,
            output_gain: 2.0,
            ..LimiterSettings::default()
        };
        let mut l = limiter(1, false, settings);
        let latency = l.latency();

        let input = sine(4096, 440.0, 0.4);
        let output = run_mono(&mut l, &input, None);

        for &v in &output[..latency] {
            assert_eq!(v, 0.0);
        }
        for i in latency..input.len() {
            assert_relative_eq!(output[i], input[i - latency] * 0.5 * 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_wet_and_dry_line_up_at_44k1() {
        for oversampling in [Oversampling::Half3x, Oversampling::Half4x, Oversampling::Half6x] {
            let settings = LimiterSettings {
                oversampling,
                boost: false,
                alr: false,
                ..LimiterSettings::default()
            };
            let mut wet = limiter_at(44_100.0, 1, false, settings);
            let mut dry = limiter_at(
                44_100.0,
                1,
                false,
                LimiterSettings {
                    bypass: true,
                    ..settings
                },
            );
            dry.reset();

            let latency = wet.latency();
            assert_eq!(latency, dry.latency());
            assert_eq!(wet.channels[0].detector.latency() % oversampling.factor(), 0);

            let input = sine(4096, 440.0, 0.3);
            let wet_out = run_mono(&mut wet, &input, None);
            let dry_out = run_mono(&mut dry, &input, None);
            for i in latency..input.len() {
                assert_eq!(dry_out[i], input[i - latency]);
                assert_relative_eq!(wet_out[i], dry_out[i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_step_gain_history_attacks_then_recovers() {
        let settings = LimiterSettings {
            threshold: 0.5,
            boost: false,
            alr: false,
            mode: LimiterMode::HermThin,
            lookahead: 1.0,
            attack: 1.0,
            release: 1.0,
            ..LimiterSettings::default()
        };
        let mut l = limiter(1, false, settings);

        let mut input = vec![0.1f32; 4800];
        input.extend(std::iter::repeat(1.0).take(4800));
        input.extend(std::iter::repeat(0.1).take(9600));
        run_mono(&mut l, &input, None);

        let history = gain_history(&l, 0);
        let first = history.iter().position(|&g| g < 1.0).unwrap();
        let (deepest, &lowest) = history
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();

        assert!(lowest <= 0.5 + 1e-4);
        assert!(history[first..=deepest].windows(2).all(|w| w[1] <= w[0]));
        assert!(*history.last().unwrap() > 0.99);
    }

    #[test]
    fn test_step_response_follows_time_constants() {
        for (attack, release) in [(1.0, 5.0), (2.0, 20.0)] {
            let settings = LimiterSettings {
                threshold: 0.5,
                boost: false,
                alr: false,
                mode: LimiterMode::HermThin,
                lookahead: 1.0,
                attack,
                release,
                ..LimiterSettings::default()
            };
            let mut l = limiter(1, false, settings);
            let latency = l.latency();
            let (step_on, step_off) = (4800, 9600);

            let mut input = vec![0.1f32; step_on];
            input.resize(step_off, 1.0);
            input.resize(step_off + 9600, 0.1);
            let output = run_mono(&mut l, &input, None);
            let gain = |i: usize| output[i] / input[i - latency];

            // Untouched until the step enters the look-ahead window.
            assert!((latency..step_on).all(|i| gain(i) == 1.0));
            assert!(gain(step_on + 2) > 0.9);
            // Fully reduced by the time the step leaves the delay.
            assert!(gain(step_on + latency) <= 0.5 + 1e-4);

            // Release starts once the last loud sample has left the delay.
            let rel = millis_to_samples(SR as usize, release);
            let released = step_off + latency;
            assert!(gain(released + rel / 4) < 0.9);
            assert!(gain(released + 5 * rel) > 0.99);
        }
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut l = limiter(1, false, LimiterSettings::default());
        run_mono(&mut l, &sine(2048, 100.0, 0.9), None);

        let clear = LimiterSettings {
            clear: true,
            ..LimiterSettings::default()
        };
        l.update_settings(&clear);

        let meters = l.meters();
        let mut snapshot = vec![1.0f32; HISTORY_MESH_SIZE];
        for _ in 0..2 {
            // Drop whatever was published before.
            meters.channel(0).unwrap().mesh(GraphKind::Input).read(&mut snapshot);
            run_mono(&mut l, &sine(2048, 100.0, 0.9), None);
            assert!(meters
                .channel(0)
                .unwrap()
                .mesh(GraphKind::Input)
                .read(&mut snapshot));
            assert!(snapshot.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_pause_only_publishes_on_sync() {
        let settings = LimiterSettings {
            pause: true,
            ..LimiterSettings::default()
        };
        let mut l = limiter(1, false, settings);
        let meters = l.meters();
        let mut snapshot = vec![0.0f32; HISTORY_MESH_SIZE];

        run_mono(&mut l, &[0.5; 512], None);
        assert!(!meters.channel(0).unwrap().mesh(GraphKind::Gain).read(&mut snapshot));

        l.ui_activated();
        run_mono(&mut l, &[0.5; 512], None);
        assert!(meters.channel(0).unwrap().mesh(GraphKind::Gain).read(&mut snapshot));
    }

    #[test]
    fn test_absent_detector_source_is_silence() {
        for sc_mode in [SidechainMode::External, SidechainMode::Link] {
            let settings = LimiterSettings {
                threshold: 0.1,
                boost: false,
                sc_mode,
                ..LimiterSettings::default()
            };
            let mut l = limiter(1, true, settings);
            let latency = l.latency();

            let input = sine(2048, 300.0, 1.0);
            let output = run_mono(&mut l, &input, None);
            for i in latency..input.len() {
                assert_eq!(output[i], input[i - latency]);
            }
            assert!(gain_history(&l, 0).iter().all(|&g| g == 1.0));
        }
    }

    #[test]
    fn test_external_sidechain_drives_reduction() {
        let settings = LimiterSettings {
            threshold: 0.1,
            boost: false,
            sc_mode: SidechainMode::External,
            ..LimiterSettings::default()
        };
        let mut l = limiter(1, true, settings);
        let input = vec![0.05f32; 4096];
        let sidechain = vec![1.0f32; 4096];
        let output = run_mono(&mut l, &input, Some(&sidechain));
        // Quiet input, loud key: the tail is pulled down well below the input.
        assert!(output[4095] < 0.05 * 0.2);
    }

    #[test]
    fn test_short_sidechain_counts_as_absent() {
        let settings = LimiterSettings {
            threshold: 0.1,
            boost: false,
            sc_mode: SidechainMode::External,
            ..LimiterSettings::default()
        };
        let mut l = limiter(1, true, settings);
        let input = vec![0.05f32; 1024];
        let sidechain = vec![1.0f32; 16];
        run_mono(&mut l, &input, Some(&sidechain));
        assert!(gain_history(&l, 0).iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_full_link_shares_reduction() {
        let settings = LimiterSettings {
            threshold: 0.25,
            boost: false,
            stereo_link: 1.0,
            ..LimiterSettings::default()
        };
        let mut l = limiter(2, false, settings);
        let mut left = sine(8192, 200.0, 1.0);
        let mut right = sine(8192, 200.0, 0.1);
        run_stereo(&mut l, &mut left, &mut right);

        let gl = gain_history(&l, 0);
        let gr = gain_history(&l, 1);
        assert!(gr.iter().any(|&g| g < 0.5));
        for (a, b) in gl.iter().zip(&gr) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_unlinked_channels_are_independent() {
        let settings = LimiterSettings {
            threshold: 0.25,
            boost: false,
            stereo_link: 0.0,
            ..LimiterSettings::default()
        };
        let mut l = limiter(2, false, settings);
        let mut left = sine(8192, 200.0, 1.0);
        let mut right = sine(8192, 200.0, 0.1);
        run_stereo(&mut l, &mut left, &mut right);

        assert!(gain_history(&l, 0).iter().any(|&g| g < 0.5));
        assert!(gain_history(&l, 1).iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_chunking_is_bit_transparent() {
        let settings = LimiterSettings {
            oversampling: Oversampling::Full2x,
            dithering: Dithering::Bits16,
            threshold: 0.3,
            stereo_link: 0.6,
            premix: PremixGains {
                in_to_link: 0.5,
                ..PremixGains::default()
            },
            sc_mode: SidechainMode::Link,
            ..LimiterSettings::default()
        };
        let len = 20_000;
        let left_in: Vec<f32> = (0..len)
            .map(|i| 0.8 * (i as f32 * 0.013).sin() + 0.3 * (i as f32 * 0.21).sin())
            .collect();
        let right_in: Vec<f32> = (0..len).map(|i| 0.6 * (i as f32 * 0.031).cos()).collect();

        let mut whole = limiter(2, false, settings);
        let (mut wl, mut wr) = (left_in.clone(), right_in.clone());
        run_stereo(&mut whole, &mut wl, &mut wr);

        let mut split = limiter(2, false, settings);
        let (mut sl, mut sr) = (left_in.clone(), right_in.clone());
        let mut offset = 0;
        for size in [1, 17, 4096, 9000, len] {
            let end = (offset + size).min(len);
            run_stereo(&mut split, &mut sl[offset..end], &mut sr[offset..end]);
            offset = end;
        }

        assert_eq!(wl, sl);
        assert_eq!(wr, sr);
    }

    #[test]
    fn test_bypass_outputs_delayed_dry() {
        let settings = LimiterSettings {
            bypass: true,
            threshold: 0.1,
            ..LimiterSettings::default()
        };
        let mut l = limiter(1, false, settings);
        l.reset();
        let latency = l.latency();

        let input = sine(2048, 500.0, 1.0);
        let output = run_mono(&mut l, &input, None);
        for i in latency..input.len() {
            assert_eq!(output[i], input[i - latency]);
        }
    }

    #[test]
    fn test_channel_mismatch_silences() {
        let mut l = limiter(2, false, LimiterSettings::default());
        let output = run_mono(&mut l, &[0.5; 64], None);
        assert!(output.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_meters_publish_peaks() {
        let mut l = limiter(1, false, LimiterSettings::default());
        run_mono(&mut l, &[0.25; 256], None);
        let meters = l.meters();
        let ch = meters.channel(0).unwrap();
        assert_relative_eq!(ch.level(GraphKind::Input), 0.25);
        assert_eq!(ch.level(GraphKind::Gain), 1.0);
    }
}
