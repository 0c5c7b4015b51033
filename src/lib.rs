mod debug;
pub mod dsp;
pub mod meters;
pub mod premix;
pub mod processor;
pub mod settings;

use crate::premix::PremixGains;
use crate::processor::{ChannelIo, Limiter, LimiterConfig};
use crate::settings::{
    Dithering, LimiterMode, LimiterSettings, Oversampling, SidechainMode, ALR_ATTACK_DFL_MS,
    ALR_ATTACK_MAX_MS, ALR_ATTACK_MIN_MS, ALR_RELEASE_DFL_MS, ALR_RELEASE_MAX_MS,
    ALR_RELEASE_MIN_MS, ATTACK_DFL_MS, ATTACK_MAX_MS, ATTACK_MIN_MS, GAIN_MAX_DB, GAIN_MIN_DB,
    KNEE_MAX_DB, KNEE_MIN_DB, LOOKAHEAD_DFL_MS, LOOKAHEAD_MAX_MS, LOOKAHEAD_MIN_MS,
    PREMIX_MAX_DB, RELEASE_DFL_MS, RELEASE_MAX_MS, RELEASE_MIN_MS, SC_PREAMP_MAX_DB,
    THRESHOLD_MAX_DB, THRESHOLD_MIN_DB,
};
use anyhow::{Context, Result};
use assert_no_alloc::permit_alloc;
use nih_plug::prelude::*;
use std::sync::Arc;

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------

#[derive(Params)]
pub struct LimiterParams {
    #[id = "bypass"]
    pub bypass: BoolParam,

    #[id = "input_gain"]
    pub input_gain: FloatParam,
    #[id = "output_gain"]
    pub output_gain: FloatParam,
    #[id = "sc_preamp"]
    pub sc_preamp: FloatParam,

    #[id = "mode"]
    pub mode: EnumParam<LimiterMode>,
    #[id = "threshold"]
    pub threshold: FloatParam,
    #[id = "knee"]
    pub knee: FloatParam,
    #[id = "boost"]
    pub boost: BoolParam,
    #[id = "lookahead"]
    pub lookahead: FloatParam,
    #[id = "attack"]
    pub attack: FloatParam,
    #[id = "release"]
    pub release: FloatParam,

    #[id = "alr"]
    pub alr: BoolParam,
    #[id = "alr_attack"]
    pub alr_attack: FloatParam,
    #[id = "alr_release"]
    pub alr_release: FloatParam,

    #[id = "oversampling"]
    pub oversampling: EnumParam<Oversampling>,
    #[id = "dithering"]
    pub dithering: EnumParam<Dithering>,

    #[id = "stereo_link"]
    pub stereo_link: FloatParam,
    /// 0 = internal, 1 = external (link on variants without a sidechain), 2 = link.
    /// No link port is exposed, so the link bus only carries what the premix
    /// `*_to_link` legs put on it.
    #[id = "sc_source"]
    pub sc_source: IntParam,

    #[id = "in_to_sc"]
    pub in_to_sc: FloatParam,
    #[id = "in_to_link"]
    pub in_to_link: FloatParam,
    #[id = "link_to_in"]
    pub link_to_in: FloatParam,
    #[id = "link_to_sc"]
    pub link_to_sc: FloatParam,
    #[id = "sc_to_in"]
    pub sc_to_in: FloatParam,
    #[id = "sc_to_link"]
    pub sc_to_link: FloatParam,

    #[id = "pause"]
    pub pause: BoolParam,
    #[id = "clear"]
    pub clear: BoolParam,
}

fn format_percent(v: f32) -> String {
    format!("{:.0}%", v * 100.0)
}

fn format_db(v: f32) -> String {
    format!("{:.1} dB", v)
}

fn format_db_or_off(v: f32) -> String {
    if v <= util::MINUS_INFINITY_DB {
        "-inf dB".to_string()
    } else {
        format_db(v)
    }
}

fn format_ms(v: f32) -> String {
    format!("{:.2} ms", v)
}

fn format_sc_source(v: i32) -> String {
    match v {
        0 => "Internal".to_string(),
        1 => "External".to_string(),
        _ => "Link (premix)".to_string(),
    }
}

fn db_param(name: &str, default: f32, min: f32, max: f32) -> FloatParam {
    FloatParam::new(name, default, FloatRange::Linear { min, max })
        .with_value_to_string(Arc::new(format_db))
}

fn premix_param(name: &str) -> FloatParam {
    FloatParam::new(
        name,
        util::MINUS_INFINITY_DB,
        FloatRange::Linear {
            min: util::MINUS_INFINITY_DB,
            max: PREMIX_MAX_DB,
        },
    )
    .with_value_to_string(Arc::new(format_db_or_off))
}

fn time_param(name: &str, default: f32, min: f32, max: f32) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Skewed {
            min,
            max,
            factor: FloatRange::skew_factor(-1.0),
        },
    )
    .with_value_to_string(Arc::new(format_ms))
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            bypass: BoolParam::new("Bypass", false).make_bypass(),

            input_gain: db_param("Input Gain", 0.0, GAIN_MIN_DB, GAIN_MAX_DB),
            output_gain: db_param("Output Gain", 0.0, GAIN_MIN_DB, GAIN_MAX_DB),
            sc_preamp: db_param("Sidechain Preamp", 0.0, GAIN_MIN_DB, SC_PREAMP_MAX_DB),

            mode: EnumParam::new("Mode", LimiterMode::HermThin),
            threshold: db_param("Threshold", 0.0, THRESHOLD_MIN_DB, THRESHOLD_MAX_DB),
            knee: db_param("Knee", 0.0, KNEE_MIN_DB, KNEE_MAX_DB),
            boost: BoolParam::new("Gain Boost", true),
            lookahead: time_param(
                "Lookahead",
                LOOKAHEAD_DFL_MS,
                LOOKAHEAD_MIN_MS,
                LOOKAHEAD_MAX_MS,
            ),
            attack: time_param("Attack", ATTACK_DFL_MS, ATTACK_MIN_MS, ATTACK_MAX_MS),
            release: time_param("Release", RELEASE_DFL_MS, RELEASE_MIN_MS, RELEASE_MAX_MS),

            alr: BoolParam::new("ALR", true),
            alr_attack: time_param(
                "ALR Attack",
                ALR_ATTACK_DFL_MS,
                ALR_ATTACK_MIN_MS,
                ALR_ATTACK_MAX_MS,
            ),
            alr_release: time_param(
                "ALR Release",
                ALR_RELEASE_DFL_MS,
                ALR_RELEASE_MIN_MS,
                ALR_RELEASE_MAX_MS,
            ),

            oversampling: EnumParam::new("Oversampling", Oversampling::None),
            dithering: EnumParam::new("Dithering", Dithering::None),

            stereo_link: FloatParam::new(
                "Stereo Link",
                1.0,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(Arc::new(format_percent)),
            sc_source: IntParam::new("Sidechain Source", 0, IntRange::Linear { min: 0, max: 2 })
                .with_value_to_string(Arc::new(format_sc_source)),

            in_to_sc: premix_param("Input to Sidechain"),
            in_to_link: premix_param("Input to Link"),
            link_to_in: premix_param("Link to Input"),
            link_to_sc: premix_param("Link to Sidechain"),
            sc_to_in: premix_param("Sidechain to Input"),
            sc_to_link: premix_param("Sidechain to Link"),

            pause: BoolParam::new("Pause History", false).non_automatable(),
            clear: BoolParam::new("Clear History", false).non_automatable(),
        }
    }
}

impl LimiterParams {
    /// Reads every parameter once into a settings snapshot.
    pub fn snapshot(&self, sidechain: bool) -> LimiterSettings {
        LimiterSettings {
            bypass: self.bypass.value(),
            input_gain: util::db_to_gain(self.input_gain.value()),
            output_gain: util::db_to_gain(self.output_gain.value()),
            sc_preamp: util::db_to_gain(self.sc_preamp.value()),
            mode: self.mode.value(),
            threshold: util::db_to_gain(self.threshold.value()),
            knee: util::db_to_gain(self.knee.value()),
            boost: self.boost.value(),
            lookahead: self.lookahead.value(),
            attack: self.attack.value(),
            release: self.release.value(),
            alr: self.alr.value(),
            alr_attack: self.alr_attack.value(),
            alr_release: self.alr_release.value(),
            oversampling: self.oversampling.value(),
            dithering: self.dithering.value(),
            stereo_link: self.stereo_link.value(),
            sc_mode: SidechainMode::from_index(self.sc_source.value().max(0) as usize, sidechain),
            premix: PremixGains {
                in_to_sc: util::db_to_gain(self.in_to_sc.value()),
                in_to_link: util::db_to_gain(self.in_to_link.value()),
                link_to_in: util::db_to_gain(self.link_to_in.value()),
                link_to_sc: util::db_to_gain(self.link_to_sc.value()),
                sc_to_in: util::db_to_gain(self.sc_to_in.value()),
                sc_to_link: util::db_to_gain(self.sc_to_link.value()),
            },
            pause: self.pause.value(),
            clear: self.clear.value(),
        }
    }
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------

pub struct LinkLimiterPlugin {
    params: Arc<LimiterParams>,
    // None until a successful initialize; processing is silent meanwhile.
    limiter: Option<Limiter>,
    latency: u32,
}

impl Default for LinkLimiterPlugin {
    fn default() -> Self {
        Self {
            params: Arc::new(LimiterParams::default()),
            limiter: None,
            latency: 0,
        }
    }
}

impl Plugin for LinkLimiterPlugin {
    const NAME: &'static str = "Link Limiter";
    const VENDOR: &'static str = "Andrzej Marczewski";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[new_nonzero_u32(2)],
            names: PortNames {
                layout: Some("Stereo + Sidechain"),
                aux_inputs: &["Sidechain"],
                ..PortNames::const_default()
            },
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            names: PortNames {
                layout: Some("Stereo"),
                ..PortNames::const_default()
            },
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[new_nonzero_u32(1)],
            names: PortNames {
                layout: Some("Mono + Sidechain"),
                aux_inputs: &["Sidechain"],
                ..PortNames::const_default()
            },
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            names: PortNames {
                layout: Some("Mono"),
                ..PortNames::const_default()
            },
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        #[cfg(feature = "debug")]
        crate::debug::logger::init_logger();

        let ok = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            match self.prepare(audio_io_layout, buffer_config) {
                Ok(latency) => {
                    context.set_latency_samples(latency);
                    self.latency = latency;
                    true
                }
                Err(err) => {
                    log::error!("limiter initialization failed: {err:#}");
                    self.limiter = None;
                    false
                }
            }
        }))
        .unwrap_or(false);

        #[cfg(feature = "debug")]
        crate::debug::logger::drain();

        ok
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.process_internal(buffer, aux, context)
        }))
        .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            if let Some(limiter) = self.limiter.as_mut() {
                limiter.reset();
            }
        }))
        .unwrap_or(());
    }

    fn deactivate(&mut self) {
        #[cfg(feature = "debug")]
        crate::debug::logger::drain();
    }
}

impl LinkLimiterPlugin {
    /// Builds (or reuses) the core for `layout` and returns the latency to report.
    fn prepare(&mut self, layout: &AudioIOLayout, buffer_config: &BufferConfig) -> Result<u32> {
        let config = LimiterConfig {
            channels: layout.main_output_channels.map_or(0, NonZeroU32::get) as usize,
            sidechain: !layout.aux_input_ports.is_empty(),
        };

        if self.limiter.as_ref().map(Limiter::config) != Some(config) {
            self.limiter = None;
            let limiter = permit_alloc(|| Limiter::new(config))
                .with_context(|| format!("building a {}-channel limiter", config.channels))?;
            self.limiter = Some(limiter);
        }

        let settings = self.params.snapshot(config.sidechain);
        let limiter = self.limiter.as_mut().context("limiter missing after build")?;
        permit_alloc(|| limiter.update_sample_rate(buffer_config.sample_rate))?;
        limiter.update_settings(&settings);

        log::info!(
            "limiter ready: {} ch, sidechain {}, {} Hz, latency {} samples",
            config.channels,
            config.sidechain,
            buffer_config.sample_rate,
            limiter.latency()
        );
        Ok(limiter.latency() as u32)
    }

    fn process_internal(
        &mut self,
        buffer: &mut Buffer,
        aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let Some(limiter) = self.limiter.as_mut() else {
            for channel in buffer.as_slice() {
                channel.fill(0.0);
            }
            return ProcessStatus::Normal;
        };

        let settings = self.params.snapshot(limiter.config().sidechain);
        if settings != *limiter.settings() {
            limiter.update_settings(&settings);
        }

        let latency = limiter.latency() as u32;
        if latency != self.latency {
            context.set_latency_samples(latency);
            self.latency = latency;
        }

        let samples = buffer.samples();
        let sidechain = aux.inputs.first().map(|port| port.as_slice_immutable());
        let sc = |i: usize| sidechain.and_then(|port| port.get(i)).map(|ch| &ch[..]);

        match buffer.as_slice() {
            [left, right] => {
                let mut io = [
                    ChannelIo {
                        main: &mut left[..],
                        sidechain: sc(0),
                        link: None,
                    },
                    ChannelIo {
                        main: &mut right[..],
                        sidechain: sc(1),
                        link: None,
                    },
                ];
                limiter.process(&mut io, samples);
            }
            [mono] => {
                let mut io = [ChannelIo {
                    main: &mut mono[..],
                    sidechain: sc(0),
                    link: None,
                }];
                limiter.process(&mut io, samples);
            }
            _ => {}
        }

        ProcessStatus::Normal
    }
}

impl ClapPlugin for LinkLimiterPlugin {
    const CLAP_ID: &'static str = "com.andrzej.link-limiter";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Look-ahead limiter with sidechain, premix and stereo linking");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Limiter,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for LinkLimiterPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"LinkLimiterCore1";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Dynamics];
}

nih_export_clap!(LinkLimiterPlugin);
nih_export_vst3!(LinkLimiterPlugin);
