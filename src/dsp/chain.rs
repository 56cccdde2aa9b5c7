//! The effects chain
//!
//! A fixed graph: source into pitch shifter into distortion into reverb
//! into sink.
//! The chain holds whatever parameter values were last set and has no
//! notion of which filter is "selected"; selection lives in
//! [`ActiveFilter`](crate::dsp::ActiveFilter), and `apply` always resets
//! every unit before configuring the selected one.
//!
//! A chain instance is built fresh for every render or playback start;
//! render and playback never share one.

use crate::dsp::distortion::{Distortion, DistortionPreset};
use crate::dsp::effect::Effect;
use crate::dsp::filter::ActiveFilter;
use crate::dsp::pitch::PitchShift;
use crate::dsp::reverb::{Reverb, ReverbPreset};
use crate::engine::AudioBuffer;

/// Pitch offset per unit of filter level, in cents
///
/// Level 100 is two octaves: ±2400 cents.
pub const CENTS_PER_LEVEL: f32 = 24.0;

/// The fixed three-unit processing chain
pub struct EffectsChain {
    pitch: PitchShift,
    distortion: Distortion,
    reverb: Reverb,
}

impl EffectsChain {
    /// Create a chain with all units at rest (no processing)
    pub fn new() -> Self {
        Self {
            pitch: PitchShift::new(),
            distortion: Distortion::new(),
            reverb: Reverb::new(),
        }
    }

    /// Prepare all units for a source format
    pub fn prepare(&mut self, sample_rate: u32, max_block_frames: usize) {
        self.pitch.prepare(sample_rate, max_block_frames);
        self.distortion.prepare(sample_rate, max_block_frames);
        self.reverb.prepare(sample_rate, max_block_frames);
    }

    /// Process one block through pitch, distortion and reverb, in place
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        self.pitch.process(buffer);
        self.distortion.process(buffer);
        self.reverb.process(buffer);
    }

    /// Raise pitch: level in [0, 100] maps linearly to 0..+2400 cents
    ///
    /// Does not clear other units; use `apply` or `reset_all` first when
    /// switching filters.
    pub fn apply_high_pitch(&mut self, level: f32) {
        self.pitch.set_cents(level.clamp(0.0, 100.0) * CENTS_PER_LEVEL);
    }

    /// Lower pitch: level in [0, 100] maps linearly to 0..-2400 cents
    pub fn apply_low_pitch(&mut self, level: f32) {
        self.pitch.set_cents(-level.clamp(0.0, 100.0) * CENTS_PER_LEVEL);
    }

    /// Alien voice: loads the alien-chatter preset, wet/dry mix = level
    pub fn apply_alien(&mut self, level: f32) {
        self.distortion.load_preset(DistortionPreset::AlienChatter);
        self.distortion.set_mix(level);
    }

    /// Reverb: loads the cathedral preset, wet/dry mix = level
    pub fn apply_reverb(&mut self, level: f32) {
        self.reverb.load_preset(ReverbPreset::Cathedral);
        self.reverb.set_mix(level);
    }

    /// Zero the pitch offset and both wet/dry mixes
    ///
    /// Idempotent; always safe to call before activating a new filter.
    pub fn reset_all(&mut self) {
        self.pitch.set_cents(0.0);
        self.distortion.set_mix(0.0);
        self.reverb.set_mix(0.0);
    }

    /// Reset parameters and apply one filter selection
    ///
    /// The tagged union makes a stale parameter from a previously active
    /// filter impossible: every variant goes through `reset_all` first.
    pub fn apply(&mut self, filter: ActiveFilter) {
        self.reset_all();
        match filter {
            ActiveFilter::None => {}
            ActiveFilter::HighPitch(level) => self.apply_high_pitch(level),
            ActiveFilter::LowPitch(level) => self.apply_low_pitch(level),
            ActiveFilter::Alien(level) => self.apply_alien(level),
            ActiveFilter::Reverb(level) => self.apply_reverb(level),
        }
    }

    /// Current pitch offset in cents
    pub fn pitch_cents(&self) -> f32 {
        self.pitch.cents()
    }

    /// Current distortion wet/dry mix
    pub fn distortion_mix(&self) -> f32 {
        self.distortion.mix()
    }

    /// Current reverb wet/dry mix
    pub fn reverb_mix(&self) -> f32 {
        self.reverb.mix()
    }

    /// Currently loaded distortion preset
    pub fn distortion_preset(&self) -> DistortionPreset {
        self.distortion.preset()
    }

    /// Currently loaded reverb preset
    pub fn reverb_preset(&self) -> ReverbPreset {
        self.reverb.preset()
    }
}

impl Default for EffectsChain {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
