//! Distortion effect
//!
//! Speech-mangling distortion built from ring modulation and soft
//! waveshaping. Presets fix the modulator frequency and drive; the only
//! user-facing parameter is the wet/dry mix on a 0-100 scale.

use crate::dsp::effect::Effect;
use crate::engine::AudioBuffer;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Wet/dry mix range, inclusive
const MIN_MIX: f32 = 0.0;
const MAX_MIX: f32 = 100.0;

// ============================================================================
// Presets
// ============================================================================

/// Fixed distortion voicings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistortionPreset {
    /// Fast ring modulation with moderate drive, the classic chattering
    /// alien voice
    #[default]
    AlienChatter,
    /// Slow ring modulation with heavy drive, a hollow droning timbre
    CosmicInterference,
    /// Mid-rate modulation with light drive, a broken-transmitter rasp
    RadioTower,
}

impl DistortionPreset {
    /// Ring modulator frequency in Hz
    fn modulator_hz(&self) -> f32 {
        match self {
            DistortionPreset::AlienChatter => 180.0,
            DistortionPreset::CosmicInterference => 35.0,
            DistortionPreset::RadioTower => 90.0,
        }
    }

    /// Waveshaper drive
    fn drive(&self) -> f32 {
        match self {
            DistortionPreset::AlienChatter => 2.0,
            DistortionPreset::CosmicInterference => 3.5,
            DistortionPreset::RadioTower => 1.2,
        }
    }

    /// String identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            DistortionPreset::AlienChatter => "alien-chatter",
            DistortionPreset::CosmicInterference => "cosmic-interference",
            DistortionPreset::RadioTower => "radio-tower",
        }
    }
}

// ============================================================================
// Distortion
// ============================================================================

/// Ring-mod distortion unit with preset voicing and wet/dry mix
#[derive(Debug, Clone)]
pub struct Distortion {
    preset: DistortionPreset,
    mix: f32,
    sample_rate: u32,
    phase: f32,
}

impl Distortion {
    /// Create a unit with the default preset and a fully dry mix
    pub fn new() -> Self {
        Self {
            preset: DistortionPreset::default(),
            mix: 0.0,
            sample_rate: crate::engine::buffer::DEFAULT_SAMPLE_RATE,
            phase: 0.0,
        }
    }

    /// Load a preset voicing
    ///
    /// Modulator phase restarts so the voicing is reproducible.
    pub fn load_preset(&mut self, preset: DistortionPreset) {
        self.preset = preset;
        self.phase = 0.0;
    }

    /// Currently loaded preset
    pub fn preset(&self) -> DistortionPreset {
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
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Distortion {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.mix <= 0.0 {
            return;
        }

        let wet_amount = self.mix / MAX_MIX;
        let dry_amount = 1.0 - wet_amount;
        let drive = self.preset.drive();
        let phase_step =
            2.0 * std::f32::consts::PI * self.preset.modulator_hz() / self.sample_rate as f32;

        let num_frames = buffer.num_frames();
        for frame in 0..num_frames {
            let modulator = self.phase.sin();
            self.phase += phase_step;
            if self.phase > 2.0 * std::f32::consts::PI {
                self.phase -= 2.0 * std::f32::consts::PI;
            }

            for channel in buffer.samples.iter_mut() {
                let dry = channel[frame];
                let wet = (dry * (1.0 + drive)).tanh() * modulator;
                channel[frame] = dry * dry_amount + wet * wet_amount;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn effect_type(&self) -> &'static str {
        "distortion"
    }
}

// ============================================================================
// Tests
// ============================================================================
