//! Effect trait definition
//!
//! Base trait for the three processing units in the chain. Effects process
//! planar buffers in place and may keep internal state between blocks
//! (delay lines, grain accumulators), cleared by `reset`.

use crate::engine::AudioBuffer;

/// Base trait for chain processing units
pub trait Effect: Send {
    /// Process one block in place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Prepare for processing
    ///
    /// Called when the source sample rate or block size changes, before the
    /// first block.
    fn prepare(&mut self, sample_rate: u32, max_block_frames: usize);

    /// Clear internal state (delay lines, accumulators)
    ///
    /// Parameter values are kept; only signal history is dropped.
    fn reset(&mut self);

    /// Effect type identifier
    fn effect_type(&self) -> &'static str;
}
