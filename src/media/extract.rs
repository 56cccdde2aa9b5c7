//! Audio extraction
//!
//! Demuxes and decodes the first audio track of a container into a
//! standalone WAV file spanning the track's full native range from time
//! zero. The WAV keeps the decoded sample rate and channel layout, so the
//! render input format is exactly what the decoder produced.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;

use crate::engine::buffer::AudioBuffer;
use crate::engine::io::export_wav;
use crate::error::{Result, VocoError};
use crate::media::asset::probe_container;
use crate::media::job::ExportJob;

/// Extract the first audio track of `input` to a WAV at `output`
///
/// Overwrites any stale file at `output`. Fails with `NoAudioTrack` when
/// the container has no decodable audio.
pub fn extract_audio(input: &Path, output: &Path) -> Result<PathBuf> {
    let mut probed = probe_container(input)?;
    let format = &mut probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VocoError::NoAudioTrack {
            path: input.display().to_string(),
        })?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VocoError::InvalidMedia {
            reason: format!("no decoder for audio track: {}", e),
            source: Some(Box::new(e)),
        })?;

    let mut planar: Vec<Vec<f32>> = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(VocoError::InvalidMedia {
                    reason: format!("demux error: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if planar.is_empty() {
                    sample_rate = decoded.spec().rate;
                    planar = vec![Vec::new(); decoded.spec().channels.count()];
                }
                copy_audio_buffer(&decoded, &mut planar);
            }
            // A malformed packet is skipped, not fatal
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("skipping malformed packet in {}: {}", input.display(), e);
            }
            Err(e) => {
                return Err(VocoError::InvalidMedia {
                    reason: format!("decode error: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        }
    }

    if planar.is_empty() || planar[0].is_empty() || sample_rate == 0 {
        return Err(VocoError::InvalidMedia {
            reason: format!("audio track in {} decoded to nothing", input.display()),
            source: None,
        });
    }

    debug!(
        "extracted {} frames @ {} Hz x{} from {}",
        planar[0].len(),
        sample_rate,
        planar.len(),
        input.display()
    );

    // Stale output from an earlier run; removal is best-effort
    let _ = std::fs::remove_file(output);

    let buffer = AudioBuffer::from_planar(planar, sample_rate)?;
    export_wav(&buffer, output)?;

    Ok(output.to_path_buf())
}

/// Append decoded samples to planar f32 channels
fn copy_audio_buffer(buffer: &AudioBufferRef, output: &mut [Vec<f32>]) {
    match buffer {
        AudioBufferRef::F32(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(buf.chan(ch).iter().copied());
                }
            }
        }
        AudioBufferRef::F64(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(buf.chan(ch).iter().map(|&s| s as f32));
                }
            }
        }
        AudioBufferRef::S16(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(buf.chan(ch).iter().map(|&s| s as f32 / 32768.0));
                }
            }
        }
        AudioBufferRef::S24(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(buf.chan(ch).iter().map(|s| s.0 as f32 / 8388608.0));
                }
            }
        }
        AudioBufferRef::S32(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(buf.chan(ch).iter().map(|&s| s as f32 / 2147483648.0));
                }
            }
        }
        AudioBufferRef::U8(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(buf.chan(ch).iter().map(|&s| (s as f32 - 128.0) / 128.0));
                }
            }
        }
        AudioBufferRef::U16(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(
                        buf.chan(ch).iter().map(|&s| (s as f32 - 32768.0) / 32768.0),
                    );
                }
            }
        }
        AudioBufferRef::U24(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(
                        buf.chan(ch)
                            .iter()
                            .map(|s| (s.0 as f32 - 8388608.0) / 8388608.0),
                    );
                }
            }
        }
        AudioBufferRef::U32(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(
                        buf.chan(ch)
                            .iter()
                            .map(|&s| (s as f32 - 2147483648.0) / 2147483648.0),
                    );
                }
            }
        }
        AudioBufferRef::S8(buf) => {
            for (ch, out_ch) in output.iter_mut().enumerate() {
                if ch < buf.spec().channels.count() {
                    out_ch.extend(buf.chan(ch).iter().map(|&s| s as f32 / 128.0));
                }
            }
        }
    }
}

/// Asynchronous extraction on a worker thread
///
/// The returned job delivers the result exactly once through its channel;
/// cancelling discards the output file.
pub fn extract_audio_job(input: PathBuf, output: PathBuf) -> ExportJob {
    ExportJob::spawn(move |cancelled| {
        let result = extract_audio(&input, &output);
        if cancelled.load(std::sync::atomic::Ordering::SeqCst) {
            let _ = std::fs::remove_file(&output);
            return Err(VocoError::Cancelled);
        }
        result
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{export_wav, generate_test_tone, import_wav};
    use tempfile::tempdir;

    #[test]
    fn test_extract_from_wav_container() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        let output = dir.path().join("extracted_audio.wav");

        let tone = generate_test_tone(440.0, 1.0, 44100);
        export_wav(&tone, &input).unwrap();

        let extracted = extract_audio(&input, &output).unwrap();
        assert_eq!(extracted, output);

        let audio = import_wav(&output).unwrap();
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.num_channels(), 1);
        assert_eq!(audio.num_frames(), tone.num_frames());
    }

    #[test]
    fn test_extract_overwrites_stale_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        let output = dir.path().join("extracted_audio.wav");

        export_wav(&generate_test_tone(440.0, 0.5, 44100), &input).unwrap();
        std::fs::write(&output, b"stale").unwrap();

        extract_audio(&input, &output).unwrap();
        let audio = import_wav(&output).unwrap();
        assert!(audio.num_frames() > 0);
    }

    #[test]
    fn test_extract_from_non_media_fails() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        let output = dir.path().join("out.wav");
        std::fs::write(&input, b"hello").unwrap();

        let result = extract_audio(&input, &output);
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_extract_job_delivers_result() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        let output = dir.path().join("extracted_audio.wav");
        export_wav(&generate_test_tone(440.0, 0.5, 44100), &input).unwrap();

        let job = extract_audio_job(input, output.clone());
        let path = job.wait().unwrap();
        assert_eq!(path, output);
        assert!(output.exists());
    }

    #[test]
    fn test_extract_job_reports_failure() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("missing.mp4");
        let output = dir.path().join("out.wav");

        let job = extract_audio_job(input, output);
        assert!(job.wait().is_err());
    }
}
