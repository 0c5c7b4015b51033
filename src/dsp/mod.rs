pub mod blink;
pub mod bypass;
pub mod delay;
pub mod detector;
pub mod dither;
pub mod history;
pub mod oversampler;
pub mod stereo_link;
pub mod utils;

pub use blink::Blink;
pub use bypass::Bypass;
pub use delay::Delay;
pub use detector::{Curve, LookaheadDetector, Shape};
pub use dither::Dither;
pub use history::{HistoryGraph, MeterMethod};
pub use oversampler::Oversampler;
pub use stereo_link::link_gains;
