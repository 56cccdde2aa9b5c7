//! Audio file I/O
//!
//! WAV is the pipeline's working format: extraction writes it, the offline
//! renderer reads and writes it. Buffers keep the file's own sample rate,
//! and exports reuse the source spec so a render preserves format.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, VocoError};

/// Import a WAV file into a planar buffer
///
/// All bit depths hound understands are converted to f32; the source
/// sample rate is preserved.
pub fn import_wav(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(VocoError::FileSystem {
            path: path.display().to_string(),
            reason: "file not found".to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| VocoError::InvalidMedia {
        reason: format!("failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let sample_rate = spec.sample_rate;
    if channels == 0 {
        return Err(VocoError::InvalidMedia {
            reason: "WAV header declares zero channels".to_string(),
            source: None,
        });
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let planar = deinterleave(&interleaved, channels);

    AudioBuffer::from_planar(planar, sample_rate)
}

/// Export a buffer to a WAV file as 32-bit float
///
/// Overwrites any existing file at `path`. The buffer's own sample rate is
/// written to the header.
pub fn export_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| VocoError::FileSystem {
        path: path.display().to_string(),
        reason: format!("failed to create WAV file: {}", e),
    })?;

    for sample in interleave(&buffer.samples) {
        writer
            .write_sample(sample)
            .map_err(|e| VocoError::FileSystem {
                path: path.display().to_string(),
                reason: format!("failed to write sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| VocoError::FileSystem {
        path: path.display().to_string(),
        reason: format!("failed to finalize WAV file: {}", e),
    })?;

    Ok(())
}

/// Incremental WAV writer used by the offline render loop
///
/// Wraps `hound::WavWriter` so the renderer can append one processed block
/// at a time without holding the whole output in memory.
pub struct BlockWriter {
    writer: Option<WavWriter<std::io::BufWriter<std::fs::File>>>,
    path: std::path::PathBuf,
}

impl BlockWriter {
    /// Create a writer matching the source format (f32, source rate/channels)
    pub fn create(path: &Path, channels: u16, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec).map_err(|e| VocoError::FileSystem {
            path: path.display().to_string(),
            reason: format!("failed to create WAV file: {}", e),
        })?;
        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
        })
    }

    /// Append one planar block
    pub fn write_block(&mut self, block: &AudioBuffer) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| VocoError::FileSystem {
            path: self.path.display().to_string(),
            reason: "writer already finalized".to_string(),
        })?;
        for sample in interleave(&block.samples) {
            writer
                .write_sample(sample)
                .map_err(|e| VocoError::FileSystem {
                    path: self.path.display().to_string(),
                    reason: format!("failed to write sample: {}", e),
                })?;
        }
        Ok(())
    }

    /// Finish the file, flushing the header
    pub fn finalize(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| VocoError::FileSystem {
                path: self.path.display().to_string(),
                reason: format!("failed to finalize WAV file: {}", e),
            })?;
        }
        Ok(())
    }
}

/// Generate a mono sine tone, for tests and fixtures
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(
        num_frames,
        crate::engine::buffer::ChannelLayout::Mono,
        sample_rate,
    );

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.channel_mut(0).iter_mut().enumerate() {
        *sample = (angular_freq * i as f32).sin();
    }

    buffer
}

// ============================================================================
// Internal helpers
// ============================================================================

/// Read samples from a WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| VocoError::InvalidMedia {
                reason: format!("failed to read float samples: {}", e),
                source: Some(Box::new(e)),
            }),
        SampleFormat::Int => match bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| VocoError::InvalidMedia {
                    reason: format!("failed to read 16-bit samples: {}", e),
                    source: Some(Box::new(e)),
                }),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| VocoError::InvalidMedia {
                    reason: format!("failed to read 24-bit samples: {}", e),
                    source: Some(Box::new(e)),
                }),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| VocoError::InvalidMedia {
                    reason: format!("failed to read 32-bit int samples: {}", e),
                    source: Some(Box::new(e)),
                }),
            other => Err(VocoError::InvalidMedia {
                reason: format!("{}-bit integer audio is not supported", other),
                source: None,
            }),
        },
    }
}

/// De-interleave [L,R,L,R,...] into [[L,L,...],[R,R,...]]
pub(crate) fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels.max(1);
    let mut result = vec![Vec::with_capacity(frames); channels];
    for (i, sample) in samples.iter().enumerate() {
        result[i % channels].push(*sample);
    }
    result
}

/// Interleave [[L,L,...],[R,R,...]] into [L,R,L,R,...]
pub(crate) fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    if channels.is_empty() {
        return Vec::new();
    }
    let frames = channels[0].len();
    let mut result = Vec::with_capacity(frames * channels.len());
    for frame in 0..frames {
        for channel in channels {
            result.push(channel[frame]);
        }
    }
    result
}

// ============================================================================
// Tests
// ============================================================================
