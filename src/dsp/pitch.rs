//! Pitch shifter
//!
//! Granular time-domain pitch shifting: overlapping Hann-windowed grains
//! are read from the input at a rate of `2^(cents/1200)` and overlap-added
//! at the original hop, so duration is preserved while pitch moves. The
//! unit is streaming: it keeps grain state between blocks and emits with a
//! fixed latency sized for the maximum shift of two octaves.
//!
//! At zero cents the unit is a true bypass with no latency.

use crate::dsp::effect::Effect;
use crate::engine::AudioBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Maximum pitch offset in cents (two octaves)
pub const MAX_PITCH_CENTS: f32 = 2400.0;

/// Grain length in frames
const GRAIN_FRAMES: usize = 2048;

/// Synthesis hop in frames (4x overlap)
const HOP_FRAMES: usize = 512;

/// Fixed output latency in frames
///
/// A grain centered at its synthesis position reads up to
/// `GRAIN/2 * ratio` frames ahead; at the maximum ratio of 4 that is two
/// grain lengths, plus one hop of slack.
const LATENCY_FRAMES: usize = 2 * GRAIN_FRAMES + HOP_FRAMES;

/// Below this accumulated window weight a sample is treated as unsynthesized
const MIN_WINDOW_WEIGHT: f32 = 1e-4;

// ============================================================================
// Per-channel grain state
// ============================================================================

#[derive(Debug, Default, Clone)]
struct ChannelState {
    /// Buffered input, absolute index of element 0 is `in_base`
    input: Vec<f32>,
    in_base: usize,
    /// Total input frames seen
    total_in: usize,
    /// Overlap-add accumulator and window-weight accumulator
    out: Vec<f32>,
    norm: Vec<f32>,
    out_base: usize,
    /// Next grain index (synthesis position = index * hop)
    next_grain: usize,
    /// Total output frames emitted
    emitted: usize,
}

impl ChannelState {
    fn clear(&mut self) {
        *self = ChannelState::default();
    }
}

// ============================================================================
// PitchShift
// ============================================================================

/// Duration-preserving pitch shifter with a cents interface
#[derive(Debug, Clone)]
pub struct PitchShift {
    cents: f32,
    window: Vec<f32>,
    channels: Vec<ChannelState>,
}

impl PitchShift {
    /// Create a shifter at zero offset (bypass)
    pub fn new() -> Self {
        let window = (0..GRAIN_FRAMES)
            .map(|j| {
                let phase = 2.0 * std::f32::consts::PI * j as f32 / GRAIN_FRAMES as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();
        Self {
            cents: 0.0,
            window,
            channels: Vec::new(),
        }
    }

    /// Set the pitch offset in cents, clamped to ±2400
    pub fn set_cents(&mut self, cents: f32) {
        self.cents = cents.clamp(-MAX_PITCH_CENTS, MAX_PITCH_CENTS);
    }

    /// Current pitch offset in cents
    pub fn cents(&self) -> f32 {
        self.cents
    }

    /// Input read rate for the current offset
    fn ratio(&self) -> f64 {
        2.0_f64.powf(self.cents as f64 / 1200.0)
    }

    fn process_channel(state: &mut ChannelState, window: &[f32], data: &mut [f32], ratio: f64) {
        state.input.extend_from_slice(data);
        state.total_in += data.len();

        // Synthesize every grain whose input span is fully buffered
        loop {
            let start = state.next_grain * HOP_FRAMES;
            let half = GRAIN_FRAMES as f64 / 2.0;
            let max_read = start as f64 + half * ratio + 2.0;
            if max_read >= state.total_in as f64 {
                break;
            }

            let needed = start + GRAIN_FRAMES - state.out_base;
            if state.out.len() < needed {
                state.out.resize(needed, 0.0);
                state.norm.resize(needed, 0.0);
            }

            for (j, &w) in window.iter().enumerate() {
                let src_pos = start as f64 + (j as f64 - half) * ratio;
                let sample = if src_pos < state.in_base as f64 {
                    0.0
                } else {
                    let local = src_pos - state.in_base as f64;
                    let i0 = local.floor() as usize;
                    let frac = (local - i0 as f64) as f32;
                    let s0 = state.input.get(i0).copied().unwrap_or(0.0);
                    let s1 = state.input.get(i0 + 1).copied().unwrap_or(s0);
                    s0 * (1.0 - frac) + s1 * frac
                };

                let local_out = start - state.out_base + j;
                state.out[local_out] += sample * w;
                state.norm[local_out] += w;
            }

            state.next_grain += 1;
        }

        // Emit at fixed latency
        for (i, slot) in data.iter_mut().enumerate() {
            let abs_out = state.emitted + i;
            *slot = if abs_out < LATENCY_FRAMES {
                0.0
            } else {
                let q = abs_out - LATENCY_FRAMES;
                if q < state.out_base {
                    0.0
                } else {
                    let local = q - state.out_base;
                    match (state.out.get(local), state.norm.get(local)) {
                        (Some(&v), Some(&w)) if w > MIN_WINDOW_WEIGHT => v / w,
                        _ => 0.0,
                    }
                }
            };
        }
        state.emitted += data.len();

        Self::prune(state);
    }

    /// Drop buffered history no future grain or emission can reach
    fn prune(state: &mut ChannelState) {
        let next_start = state.next_grain * HOP_FRAMES;
        let input_keep_from = next_start.saturating_sub(2 * GRAIN_FRAMES + HOP_FRAMES);
        if input_keep_from > state.in_base + 8192 {
            let drop = input_keep_from - state.in_base;
            state.input.drain(..drop.min(state.input.len()));
            state.in_base = input_keep_from;
        }

        let out_keep_from = state.emitted.saturating_sub(LATENCY_FRAMES);
        if out_keep_from > state.out_base + 8192 {
            let drop = out_keep_from - state.out_base;
            let drop = drop.min(state.out.len());
            state.out.drain(..drop);
            state.norm.drain(..drop);
            state.out_base += drop;
        }
    }
}

impl Default for PitchShift {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for PitchShift {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        // Zero offset is a true bypass
        if self.cents.abs() < f32::EPSILON {
            return;
        }

        if self.channels.len() != buffer.num_channels() {
            self.channels = vec![ChannelState::default(); buffer.num_channels()];
        }

        let ratio = self.ratio();
        for (state, channel) in self.channels.iter_mut().zip(buffer.samples.iter_mut()) {
            Self::process_channel(state, &self.window, channel, ratio);
        }
    }

    fn prepare(&mut self, _sample_rate: u32, _max_block_frames: usize) {
        for state in &mut self.channels {
            state.clear();
        }
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            state.clear();
        }
    }

    fn effect_type(&self) -> &'static str {
        "pitch"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;

    const SAMPLE_RATE: u32 = 44100;

    /// Run a tone through the shifter in render-sized blocks
    fn shift_tone(frequency: f32, cents: f32, duration_secs: f32) -> Vec<f32> {
        let tone = generate_test_tone(frequency, duration_secs, SAMPLE_RATE);
        let mut shifter = PitchShift::new();
        shifter.set_cents(cents);
        shifter.prepare(SAMPLE_RATE, 4096);

        let mut output = Vec::new();
        let mut cursor = 0;
        while cursor < tone.num_frames() {
            let mut block = tone.slice(cursor, 4096);
            shifter.process(&mut block);
            output.extend_from_slice(block.channel(0));
            cursor += 4096;
        }
        output
    }

    /// Count zero crossings in a slice
    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count()
    }

    #[test]
    fn test_set_cents_clamps() {
        let mut shifter = PitchShift::new();
        shifter.set_cents(5000.0);
        assert_eq!(shifter.cents(), MAX_PITCH_CENTS);
        shifter.set_cents(-5000.0);
        assert_eq!(shifter.cents(), -MAX_PITCH_CENTS);
    }

    #[test]
    fn test_zero_cents_is_bypass() {
        let tone = generate_test_tone(440.0, 0.1, SAMPLE_RATE);
        let mut block = tone.clone();
        let mut shifter = PitchShift::new();
        shifter.prepare(SAMPLE_RATE, 4096);
        shifter.process(&mut block);
        assert_eq!(tone.channel(0), block.channel(0));
    }

    #[test]
    fn test_duration_preserved() {
        let output = shift_tone(440.0, 700.0, 0.5);
        let expected = (0.5 * SAMPLE_RATE as f32) as usize;
        assert_eq!(output.len(), expected);
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let output = shift_tone(440.0, 1200.0, 1.0);

        // Inspect a steady-state window well past the warmup latency
        let start = LATENCY_FRAMES + GRAIN_FRAMES;
        let window = &output[start..start + SAMPLE_RATE as usize / 4];
        let crossings = zero_crossings(window);

        // 880 Hz over 0.25 s is ~440 crossings
        let expected = 440.0;
        let measured = crossings as f32;
        assert!(
            (measured - expected).abs() / expected < 0.2,
            "expected ~{} crossings, measured {}",
            expected,
            measured
        );
    }

    #[test]
    fn test_octave_down_halves_frequency() {
        let output = shift_tone(440.0, -1200.0, 1.0);

        let start = LATENCY_FRAMES + GRAIN_FRAMES;
        let window = &output[start..start + SAMPLE_RATE as usize / 4];
        let crossings = zero_crossings(window);

        // 220 Hz over 0.25 s is ~110 crossings
        let expected = 110.0;
        let measured = crossings as f32;
        assert!(
            (measured - expected).abs() / expected < 0.25,
            "expected ~{} crossings, measured {}",
            expected,
            measured
        );
    }

    #[test]
    fn test_shifted_output_has_energy() {
        let output = shift_tone(440.0, 600.0, 0.6);
        let tail = &output[LATENCY_FRAMES..];
        let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.25, "shifted output too quiet: peak {}", peak);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut shifter = PitchShift::new();
        shifter.set_cents(1200.0);
        shifter.prepare(SAMPLE_RATE, 4096);

        let tone = generate_test_tone(440.0, 0.2, SAMPLE_RATE);
        let mut block = tone.clone();
        shifter.process(&mut block);
        let first_run = block.channel(0).to_vec();

        shifter.reset();
        let mut block = tone.clone();
        shifter.process(&mut block);
        assert_eq!(first_run, block.channel(0));
    }
}
