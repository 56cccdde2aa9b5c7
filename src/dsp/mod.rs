//! DSP effects
//!
//! The three processing units of the voice-filter chain and the filter
//! selection model. All units implement [`Effect`] for uniform block
//! processing.

mod chain;
mod distortion;
mod effect;
mod filter;
mod pitch;
mod reverb;

pub use chain::{EffectsChain, CENTS_PER_LEVEL};
pub use distortion::{Distortion, DistortionPreset};
pub use effect::Effect;
pub use filter::{ActiveFilter, FilterKind, MAX_LEVEL, MIN_LEVEL};
pub use pitch::{PitchShift, MAX_PITCH_CENTS};
pub use reverb::{Reverb, ReverbPreset};
