//! Muxer
//!
//! Recombines the original video stream with the rendered audio into one
//! output container. The video track is stream-copied, which also keeps
//! its intrinsic transform (rotation/orientation); the rendered audio is
//! encoded at a high bitrate. `-shortest` truncates the output to the
//! shorter of the two tracks, both inserted from time zero. No fade, no
//! silence padding.
//!
//! Container writing is delegated to an `ffmpeg` binary. The `Remuxer`
//! trait is the seam that lets the session run against a stand-in in
//! tests, the way the engine's other external collaborators are mocked.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::error::{Result, VocoError};
use crate::media::job::ExportJob;

/// Video+audio merge seam
pub trait Remuxer: Send + Sync {
    /// Merge `video`'s video stream with `audio` into `output`
    ///
    /// Overwrites any stale file at `output`. Output duration is the
    /// shorter of the two inputs.
    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf>;
}

/// `ffmpeg`-backed muxer
pub struct FfmpegMuxer {
    binary: PathBuf,
}

impl FfmpegMuxer {
    /// Muxer using `ffmpeg` from `PATH`
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Muxer using an explicit binary path
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// True if the configured binary can be executed
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Remuxer for FfmpegMuxer {
    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        // Stale output removal is best-effort; -y overwrites anyway
        let _ = std::fs::remove_file(output);

        let args = merge_args(video, audio, output);
        debug!("running {} {:?}", self.binary.display(), args);

        let result = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| VocoError::ExportFailed {
                reason: format!("failed to spawn {}: {}", self.binary.display(), e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let _ = std::fs::remove_file(output);
            return Err(map_ffmpeg_failure(video, audio, &stderr));
        }

        info!(
            "merged {} + {} -> {}",
            video.display(),
            audio.display(),
            output.display()
        );
        Ok(output.to_path_buf())
    }
}

/// Asynchronous merge on a worker thread
pub fn merge_job(
    muxer: std::sync::Arc<dyn Remuxer>,
    video: PathBuf,
    audio: PathBuf,
    output: PathBuf,
) -> ExportJob {
    ExportJob::spawn(move |cancelled| {
        let result = muxer.merge(&video, &audio, &output);
        if cancelled.load(std::sync::atomic::Ordering::SeqCst) {
            let _ = std::fs::remove_file(&output);
            return Err(VocoError::Cancelled);
        }
        result
    })
}

/// Argument list for a merge invocation
///
/// Stream-copies the first video stream of the first input and encodes the
/// second input's audio; `-shortest` enforces min-duration truncation and
/// `+faststart` front-loads the index for streaming.
pub(crate) fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-nostdin".into(),
        "-i".into(),
        video.as_os_str().to_os_string(),
        "-i".into(),
        audio.as_os_str().to_os_string(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "256k".into(),
        "-shortest".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.as_os_str().to_os_string(),
    ]
}

/// Translate an ffmpeg failure into the pipeline taxonomy
///
/// Stream-mapping failures identify which input lacked its track; anything
/// else surfaces as `ExportFailed` with the stderr tail.
fn map_ffmpeg_failure(video: &Path, audio: &Path, stderr: &str) -> VocoError {
    if stderr.contains("Stream map '0:v:0' matches no streams") {
        return VocoError::NoVideoTrack {
            path: video.display().to_string(),
        };
    }
    if stderr.contains("Stream map '1:a:0' matches no streams") {
        return VocoError::NoAudioTrack {
            path: audio.display().to_string(),
        };
    }

    let tail: String = stderr
        .lines()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n");
    VocoError::ExportFailed {
        reason: format!("ffmpeg exited with an error:\n{}", tail),
    }
}

// ============================================================================
// Tests
// ============================================================================
