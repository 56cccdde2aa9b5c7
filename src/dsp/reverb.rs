//! Reverb effect
//!
//! Freeverb topology: 8 parallel lowpass-feedback comb filters into 4
//! series allpass filters per channel, with a small delay spread on the
//! right channel. Presets fix room size and damping; the user-facing
//! parameter is the wet/dry mix on a 0-100 scale.

use crate::dsp::effect::Effect;
use crate::engine::AudioBuffer;
use serde::{Deserialize, Serialize};

// ============================================================================
// Freeverb constants
// ============================================================================

/// Reference sample rate for the tuned delay lengths
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at the reference rate
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at the reference rate
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Delay offset for the right channel, in samples
const STEREO_SPREAD: usize = 23;

/// Fixed allpass gain
const ALLPASS_GAIN: f32 = 0.5;

/// Input attenuation into the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Room size to comb feedback mapping
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;

/// Damping scale
const DAMP_SCALE: f32 = 0.4;

/// Wet/dry mix range, inclusive
const MIN_MIX: f32 = 0.0;
const MAX_MIX: f32 = 100.0;

// ============================================================================
// Presets
// ============================================================================

/// Fixed reverb spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReverbPreset {
    /// Long, bright tail of a large stone room
    #[default]
    Cathedral,
    /// Mid-sized hall
    MediumHall,
    /// Tight ambience
    SmallRoom,
}

impl ReverbPreset {
    /// Room size in [0, 1]
    fn room_size(&self) -> f32 {
        match self {
            ReverbPreset::Cathedral => 0.92,
            ReverbPreset::MediumHall => 0.75,
            ReverbPreset::SmallRoom => 0.45,
        }
    }

    /// Damping in [0, 1]
    fn damping(&self) -> f32 {
        match self {
            ReverbPreset::Cathedral => 0.25,
            ReverbPreset::MediumHall => 0.4,
            ReverbPreset::SmallRoom => 0.55,
        }
    }

    /// String identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            ReverbPreset::Cathedral => "cathedral",
            ReverbPreset::MediumHall => "medium-hall",
            ReverbPreset::SmallRoom => "small-room",
        }
    }
}

// ============================================================================
// Filter primitives
// ============================================================================

/// Lowpass-feedback comb filter
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp: f32,
    filter_store: f32,
}

impl Comb {
    fn new(delay: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            index: 0,
            feedback,
            damp,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - self.damp) + self.filter_store * self.damp;
        self.buffer[self.index] = input + self.filter_store * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.index = 0;
    }
}

/// Schroeder allpass filter
#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        let output = -input + buffered;
        self.buffer[self.index] = input + buffered * ALLPASS_GAIN;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// One channel's filter bank
#[derive(Debug, Clone)]
struct ChannelBank {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl ChannelBank {
    fn new(sample_rate: u32, spread: usize, feedback: f32, damp: f32) -> Self {
        let scale = sample_rate as f64 / REFERENCE_SAMPLE_RATE;
        let combs = COMB_DELAYS
            .iter()
            .map(|&d| Comb::new(((d + spread) as f64 * scale) as usize, feedback, damp))
            .collect();
        let allpasses = ALLPASS_DELAYS
            .iter()
            .map(|&d| Allpass::new(((d + spread) as f64 * scale) as usize))
            .collect();
        Self { combs, allpasses }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let attenuated = input * FIXED_GAIN;
        let mut wet: f32 = self.combs.iter_mut().map(|c| c.process(attenuated)).sum();
        for allpass in &mut self.allpasses {
            wet = allpass.process(wet);
        }
        wet
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(Comb::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
    }
}

// ============================================================================
// Reverb
// ============================================================================

/// Freeverb unit with preset spaces and wet/dry mix
#[derive(Debug, Clone)]
pub struct Reverb {
    preset: ReverbPreset,
    mix: f32,
    sample_rate: u32,
    banks: Vec<ChannelBank>,
}

impl Reverb {
    /// Create a unit with the default preset and a fully dry mix
    pub fn new() -> Self {
        Self {
            preset: ReverbPreset::default(),
            mix: 0.0,
            sample_rate: crate::engine::buffer::DEFAULT_SAMPLE_RATE,
            banks: Vec::new(),
        }
    }

    /// Load a preset space, rebuilding the filter banks
    pub fn load_preset(&mut self, preset: ReverbPreset) {
        self.preset = preset;
        self.banks.clear();
    }

    /// Currently loaded preset
    pub fn preset(&self) -> ReverbPreset {
        self.preset
    }

    /// Set the wet/dry mix (0 = dry, 100 = wet), clamped
    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(MIN_MIX, MAX_MIX);
    }

    /// Current wet/dry mix
    pub fn mix(&self) -> f32 {
        self.mix
    }

    fn ensure_banks(&mut self, num_channels: usize) {
        if self.banks.len() == num_channels {
            return;
        }
        let feedback = self.preset.room_size() * ROOM_SCALE + ROOM_OFFSET;
        let damp = self.preset.damping() * DAMP_SCALE;
        self.banks = (0..num_channels)
            .map(|ch| {
                let spread = if ch == 0 { 0 } else { STEREO_SPREAD };
                ChannelBank::new(self.sample_rate, spread, feedback, damp)
            })
            .collect();
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.mix <= 0.0 {
            return;
        }

        self.ensure_banks(buffer.num_channels());

        let wet_amount = self.mix / MAX_MIX;
        let dry_amount = 1.0 - wet_amount;

        for (bank, channel) in self.banks.iter_mut().zip(buffer.samples.iter_mut()) {
            for sample in channel.iter_mut() {
                let dry = *sample;
                let wet = bank.process(dry);
                *sample = dry * dry_amount + wet * wet_amount;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.banks.clear();
        }
        for bank in &mut self.banks {
            bank.clear();
        }
    }

    fn reset(&mut self) {
        for bank in &mut self.banks {
            bank.clear();
        }
    }

    fn effect_type(&self) -> &'static str {
        "reverb"
    }
}

// ============================================================================
// Tests
// ============================================================================
