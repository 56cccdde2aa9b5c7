//! Media asset probing
//!
//! Opens a container just far enough to know what is inside: the first
//! audio track's codec parameters and duration. The asset is immutable
//! once opened; decoding happens in the extractor.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::codecs::{CodecParameters, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, ProbeResult};

use crate::error::{Result, VocoError};

/// Parameters of a container's first audio track
#[derive(Debug, Clone)]
pub struct AudioTrackInfo {
    /// Track id inside the container
    pub track_id: u32,
    /// Declared sample rate, if the container carries one
    pub sample_rate: Option<u32>,
    /// Declared channel count, if the container carries one
    pub channels: Option<usize>,
    /// Total frames, if known without decoding
    pub n_frames: Option<u64>,
    /// Duration in seconds, if derivable from the track parameters
    pub duration_secs: Option<f64>,
}

/// An opened, probed container
#[derive(Debug, Clone)]
pub struct MediaAsset {
    path: PathBuf,
    audio: AudioTrackInfo,
}

impl MediaAsset {
    /// Probe a container and locate its first audio track
    ///
    /// Fails with `NoAudioTrack` when the container holds no decodable
    /// audio.
    pub fn open(path: &Path) -> Result<Self> {
        let probed = probe_container(path)?;

        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| VocoError::NoAudioTrack {
                path: path.display().to_string(),
            })?;

        let params = &track.codec_params;
        let audio = AudioTrackInfo {
            track_id: track.id,
            sample_rate: params.sample_rate,
            channels: params.channels.map(|c| c.count()),
            n_frames: params.n_frames,
            duration_secs: duration_from_params(params),
        };

        Ok(Self {
            path: path.to_path_buf(),
            audio,
        })
    }

    /// Path this asset was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The first audio track's parameters
    pub fn audio_track(&self) -> &AudioTrackInfo {
        &self.audio
    }
}

/// Open and probe a container file
pub(crate) fn probe_container(path: &Path) -> Result<ProbeResult> {
    let file = File::open(path).map_err(|e| VocoError::FileSystem {
        path: path.display().to_string(),
        reason: format!("failed to open media file: {}", e),
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VocoError::InvalidMedia {
            reason: format!("unrecognized container format: {}", e),
            source: Some(Box::new(e)),
        })
}

/// Derive a duration from codec parameters, when the track declares enough
fn duration_from_params(params: &CodecParameters) -> Option<f64> {
    if let (Some(tb), Some(frames)) = (params.time_base, params.n_frames) {
        let time = tb.calc_time(params.start_ts + frames);
        return Some(time.seconds as f64 + time.frac);
    }
    if let (Some(rate), Some(frames)) = (params.sample_rate, params.n_frames) {
        return Some(frames as f64 / rate as f64);
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
