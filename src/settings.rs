use nih_plug::prelude::Enum;

use crate::dsp::detector::{Curve, Shape};
use crate::dsp::utils::GAIN_AMP_0_DB;
use crate::premix::PremixGains;

// =============================================================================
// PARAMETER RANGES
// =============================================================================

pub const LOOKAHEAD_MIN_MS: f32 = 0.1;
pub const LOOKAHEAD_MAX_MS: f32 = 20.0;
pub const LOOKAHEAD_DFL_MS: f32 = 5.0;

pub const ATTACK_MIN_MS: f32 = 0.25;
pub const ATTACK_MAX_MS: f32 = 20.0;
pub const ATTACK_DFL_MS: f32 = 5.0;

pub const RELEASE_MIN_MS: f32 = 0.25;
pub const RELEASE_MAX_MS: f32 = 20.0;
pub const RELEASE_DFL_MS: f32 = 5.0;

pub const ALR_ATTACK_MIN_MS: f32 = 0.1;
pub const ALR_ATTACK_MAX_MS: f32 = 200.0;
pub const ALR_ATTACK_DFL_MS: f32 = 5.0;

pub const ALR_RELEASE_MIN_MS: f32 = 10.0;
pub const ALR_RELEASE_MAX_MS: f32 = 1000.0;
pub const ALR_RELEASE_DFL_MS: f32 = 50.0;

pub const THRESHOLD_MIN_DB: f32 = -48.0;
pub const THRESHOLD_MAX_DB: f32 = 0.0;

pub const KNEE_MIN_DB: f32 = -12.0;
pub const KNEE_MAX_DB: f32 = 12.0;

pub const GAIN_MIN_DB: f32 = -24.0;
pub const GAIN_MAX_DB: f32 = 24.0;
pub const SC_PREAMP_MAX_DB: f32 = 40.0;
pub const PREMIX_MAX_DB: f32 = 12.0;

/// Highest oversampling factor any mode selects.
pub const OVERSAMPLING_MAX: usize = 8;

// =============================================================================
// HOST-VISIBLE ENUMERATIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum Oversampling {
    #[name = "None"]
    None,
    #[name = "Half x2"]
    Half2x,
    #[name = "Half x3"]
    Half3x,
    #[name = "Half x4"]
    Half4x,
    #[name = "Half x6"]
    Half6x,
    #[name = "Half x8"]
    Half8x,
    #[name = "Full x2"]
    Full2x,
    #[name = "Full x3"]
    Full3x,
    #[name = "Full x4"]
    Full4x,
    #[name = "Full x6"]
    Full6x,
    #[name = "Full x8"]
    Full8x,
}

impl Oversampling {
    pub fn factor(self) -> usize {
        match self {
            Oversampling::None => 1,
            Oversampling::Half2x | Oversampling::Full2x => 2,
            Oversampling::Half3x | Oversampling::Full3x => 3,
            Oversampling::Half4x | Oversampling::Full4x => 4,
            Oversampling::Half6x | Oversampling::Full6x => 6,
            Oversampling::Half8x | Oversampling::Full8x => 8,
        }
    }

    /// "Full" modes filter the signal when folding it back to the host rate.
    pub fn filtering(self) -> bool {
        matches!(
            self,
            Oversampling::Full2x
                | Oversampling::Full3x
                | Oversampling::Full4x
                | Oversampling::Full6x
                | Oversampling::Full8x
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum LimiterMode {
    #[name = "Herm Thin"]
    HermThin,
    #[name = "Herm Wide"]
    HermWide,
    #[name = "Herm Tail"]
    HermTail,
    #[name = "Herm Duck"]
    HermDuck,
    #[name = "Exp Thin"]
    ExpThin,
    #[name = "Exp Wide"]
    ExpWide,
    #[name = "Exp Tail"]
    ExpTail,
    #[name = "Exp Duck"]
    ExpDuck,
    #[name = "Line Thin"]
    LineThin,
    #[name = "Line Wide"]
    LineWide,
    #[name = "Line Tail"]
    LineTail,
    #[name = "Line Duck"]
    LineDuck,
}

impl LimiterMode {
    pub fn curve(self) -> Curve {
        use LimiterMode::*;
        match self {
            HermThin | HermWide | HermTail | HermDuck => Curve::Hermite,
            ExpThin | ExpWide | ExpTail | ExpDuck => Curve::Exponential,
            LineThin | LineWide | LineTail | LineDuck => Curve::Linear,
        }
    }

    pub fn shape(self) -> Shape {
        use LimiterMode::*;
        match self {
            HermThin | ExpThin | LineThin => Shape::Thin,
            HermWide | ExpWide | LineWide => Shape::Wide,
            HermTail | ExpTail | LineTail => Shape::Tail,
            HermDuck | ExpDuck | LineDuck => Shape::Duck,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum Dithering {
    #[name = "None"]
    None,
    #[name = "7 bit"]
    Bits7,
    #[name = "8 bit"]
    Bits8,
    #[name = "11 bit"]
    Bits11,
    #[name = "12 bit"]
    Bits12,
    #[name = "15 bit"]
    Bits15,
    #[name = "16 bit"]
    Bits16,
    #[name = "23 bit"]
    Bits23,
    #[name = "24 bit"]
    Bits24,
}

impl Dithering {
    pub fn bits(self) -> usize {
        match self {
            Dithering::None => 0,
            Dithering::Bits7 => 7,
            Dithering::Bits8 => 8,
            Dithering::Bits11 => 11,
            Dithering::Bits12 => 12,
            Dithering::Bits15 => 15,
            Dithering::Bits16 => 16,
            Dithering::Bits23 => 23,
            Dithering::Bits24 => 24,
        }
    }
}

// =============================================================================
// SIDECHAIN SOURCE
// =============================================================================

/// Which signal drives the gain detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidechainMode {
    /// The channel's own (gained) input.
    Internal,
    /// The external sidechain input.
    External,
    /// The shared link signal.
    Link,
}

impl SidechainMode {
    /// Resolves a host selector index. Variants without a sidechain input only
    /// offer Internal and Link, so their index 1 already means Link.
    pub fn from_index(index: usize, sidechain_capable: bool) -> Self {
        match (index, sidechain_capable) {
            (0, _) => SidechainMode::Internal,
            (1, true) => SidechainMode::External,
            _ => SidechainMode::Link,
        }
    }
}

// =============================================================================
// SETTINGS SNAPSHOT
// =============================================================================

/// All values the limiter reads during a settings update.
///
/// Gains and thresholds are linear; times are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSettings {
    pub bypass: bool,
    pub input_gain: f32,
    pub output_gain: f32,
    pub sc_preamp: f32,

    pub mode: LimiterMode,
    pub threshold: f32,
    pub knee: f32,
    pub boost: bool,
    pub lookahead: f32,
    pub attack: f32,
    pub release: f32,

    pub alr: bool,
    pub alr_attack: f32,
    pub alr_release: f32,

    pub oversampling: Oversampling,
    pub dithering: Dithering,

    /// 0 (independent) to 1 (fully linked).
    pub stereo_link: f32,
    pub sc_mode: SidechainMode,
    pub premix: PremixGains,

    pub pause: bool,
    pub clear: bool,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            bypass: false,
            input_gain: GAIN_AMP_0_DB,
            output_gain: GAIN_AMP_0_DB,
            sc_preamp: GAIN_AMP_0_DB,
            mode: LimiterMode::HermThin,
            threshold: GAIN_AMP_0_DB,
            knee: GAIN_AMP_0_DB,
            boost: true,
            lookahead: LOOKAHEAD_DFL_MS,
            attack: ATTACK_DFL_MS,
            release: RELEASE_DFL_MS,
            alr: true,
            alr_attack: ALR_ATTACK_DFL_MS,
            alr_release: ALR_RELEASE_DFL_MS,
            oversampling: Oversampling::None,
            dithering: Dithering::None,
            stereo_link: 1.0,
            sc_mode: SidechainMode::Internal,
            premix: PremixGains::default(),
            pause: false,
            clear: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidechain_index_without_sidechain() {
        assert_eq!(SidechainMode::from_index(0, false), SidechainMode::Internal);
        assert_eq!(SidechainMode::from_index(1, false), SidechainMode::Link);
        assert_eq!(SidechainMode::from_index(5, false), SidechainMode::Link);
    }

    #[test]
    fn test_sidechain_index_with_sidechain() {
        assert_eq!(SidechainMode::from_index(0, true), SidechainMode::Internal);
        assert_eq!(SidechainMode::from_index(1, true), SidechainMode::External);
        assert_eq!(SidechainMode::from_index(2, true), SidechainMode::Link);
    }

    #[test]
    fn test_oversampling_modes() {
        assert_eq!(Oversampling::Half6x.factor(), 6);
        assert!(!Oversampling::Half6x.filtering());
        assert!(Oversampling::Full3x.filtering());
        assert_eq!(Oversampling::None.factor(), 1);
    }

    #[test]
    fn test_limiter_mode_split() {
        assert_eq!(LimiterMode::ExpDuck.curve(), Curve::Exponential);
        assert_eq!(LimiterMode::ExpDuck.shape(), Shape::Duck);
        assert_eq!(LimiterMode::LineWide.curve(), Curve::Linear);
    }
}
