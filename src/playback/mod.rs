//! Playback router
//!
//! Plays the original video and the processed audio as two decoupled
//! streams: visual playback is delegated to the UI collaborator through a
//! callback, while audio is pulled through a freshly built effects chain
//! and pushed into an [`AudioSink`] block by block, paced in real time.
//! The two are started back to back (audio first, then the video
//! callback) with no sample-accurate sync barrier; both begin at zero.
//!
//! Looping rebuilds the chain and restarts both streams from zero, with
//! the active filter threaded explicitly through each pass.

mod sink;

#[cfg(feature = "device-playback")]
pub use sink::DeviceSink;
pub use sink::{AudioSink, MemorySink, NullSink};

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};

use crate::dsp::{ActiveFilter, EffectsChain};
use crate::engine::io::{import_wav, interleave};
use crate::error::Result;

/// Streaming block size in frames
const PLAYBACK_BLOCK_FRAMES: usize = 1024;

/// Poll interval while paused
const PAUSE_POLL: Duration = Duration::from_millis(5);

/// Callback invoked when visual playback should (re)start
pub type VideoCallback = Arc<dyn Fn(&Path) + Send + Sync>;

#[derive(Default)]
struct Shared {
    playing: AtomicBool,
    paused: AtomicBool,
    stop: AtomicBool,
    looping: AtomicBool,
    passes_started: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

/// Decoupled video/audio playback with live effects
pub struct PlaybackRouter {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    on_play_video: Option<VideoCallback>,
}

impl PlaybackRouter {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            worker: None,
            on_play_video: None,
        }
    }

    /// Register the visual-playback callback
    ///
    /// Fires once per pass, right after the audio stream starts.
    pub fn set_on_play_video(&mut self, callback: VideoCallback) {
        self.on_play_video = Some(callback);
    }

    /// Enable or disable loop mode
    pub fn set_looping(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::SeqCst);
    }

    /// Current loop mode
    pub fn is_looping(&self) -> bool {
        self.shared.looping.load(Ordering::SeqCst)
    }

    /// True while a stream is active (paused counts as playing)
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    /// True while playback is paused
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Number of playback passes started (loop restarts count)
    pub fn passes_started(&self) -> usize {
        self.shared.passes_started.load(Ordering::SeqCst)
    }

    /// Last streaming error, if the worker died on one
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().expect("router poisoned").clone()
    }

    /// Start playback of `video` with processed audio from `audio`
    ///
    /// Stops any stream already running. The audio file is loaded up
    /// front, so missing or unreadable audio fails synchronously.
    pub fn play(
        &mut self,
        video: &Path,
        audio: &Path,
        filter: ActiveFilter,
        sink: Box<dyn AudioSink>,
    ) -> Result<()> {
        self.stop();

        let buffer = import_wav(audio)?;
        debug!(
            "playback start: {} ({:.2}s) with {:?}",
            audio.display(),
            buffer.duration_secs(),
            filter
        );

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        // Marked before the worker spawns so `is_playing` is immediately
        // observable to the caller
        self.shared.playing.store(true, Ordering::SeqCst);
        *self.shared.last_error.lock().expect("router poisoned") = None;

        let shared = Arc::clone(&self.shared);
        let callback = self.on_play_video.clone();
        let video = video.to_path_buf();
        let mut sink = sink;

        let worker = std::thread::Builder::new()
            .name("voco-playback".to_string())
            .spawn(move || {
                stream_loop(&shared, &buffer, filter, &video, callback, &mut sink);
                shared.playing.store(false, Ordering::SeqCst);
                sink.finish();
            })
            .expect("failed to spawn playback worker");

        self.worker = Some(worker);
        Ok(())
    }

    /// Pause audio (and, through the UI, video) without losing caches
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    /// Resume after `pause`
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    /// Stop the stream and wait for the worker to exit
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.shared.playing.store(false, Ordering::SeqCst);
    }
}

impl Default for PlaybackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackRouter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The streaming loop: one iteration per playback pass
fn stream_loop(
    shared: &Shared,
    buffer: &crate::engine::AudioBuffer,
    filter: ActiveFilter,
    video: &Path,
    callback: Option<VideoCallback>,
    sink: &mut Box<dyn AudioSink>,
) {
    let sample_rate = buffer.sample_rate();
    let channels = buffer.num_channels() as u16;
    let block_secs = PLAYBACK_BLOCK_FRAMES as f64 / sample_rate as f64;

    'passes: loop {
        // Fresh chain per pass; the filter arrives as an explicit
        // parameter, not ambient state
        let mut chain = EffectsChain::new();
        chain.apply(filter);
        chain.prepare(sample_rate, PLAYBACK_BLOCK_FRAMES);

        shared.passes_started.fetch_add(1, Ordering::SeqCst);
        shared.playing.store(true, Ordering::SeqCst);

        // Audio is rolling; now the video side starts
        if let Some(cb) = &callback {
            cb(video);
        }

        let mut cursor = 0;
        let mut was_paused = false;
        while cursor < buffer.num_frames() {
            if shared.stop.load(Ordering::SeqCst) {
                break 'passes;
            }
            if shared.paused.load(Ordering::SeqCst) {
                if !was_paused {
                    sink.pause();
                    was_paused = true;
                }
                std::thread::sleep(PAUSE_POLL);
                continue;
            }
            if was_paused {
                sink.resume();
                was_paused = false;
            }

            let mut block = buffer.slice(cursor, PLAYBACK_BLOCK_FRAMES);
            chain.process(&mut block);
            cursor += block.num_frames();

            if let Err(e) = sink.write(&interleave(&block.samples), channels, sample_rate) {
                warn!("playback sink error: {}", e);
                *shared.last_error.lock().expect("router poisoned") = Some(e.to_string());
                break 'passes;
            }

            std::thread::sleep(Duration::from_secs_f64(block_secs));
        }

        if shared.stop.load(Ordering::SeqCst) || !shared.looping.load(Ordering::SeqCst) {
            break;
        }
        debug!("looping playback of {}", video.display());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::FilterKind;
    use crate::engine::io::{export_wav, generate_test_tone};
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::tempdir;

    fn tone_file(dir: &Path, secs: f32) -> PathBuf {
        let path = dir.join("audio.wav");
        export_wav(&generate_test_tone(440.0, secs, 44100), &path).unwrap();
        path
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_play_streams_all_frames_once() {
        let dir = tempdir().unwrap();
        let audio = tone_file(dir.path(), 0.3);
        let video = dir.path().join("clip.mp4");

        let sink = MemorySink::new();
        let samples = sink.samples();

        let mut router = PlaybackRouter::new();
        router
            .play(&video, &audio, ActiveFilter::None, Box::new(sink))
            .unwrap();

        assert!(wait_until(Duration::from_secs(5), || !router.is_playing()));

        let expected = (0.3 * 44100.0) as usize;
        assert_eq!(samples.lock().unwrap().len(), expected);
        assert_eq!(router.passes_started(), 1);
        assert!(router.last_error().is_none());
    }

    #[test]
    fn test_video_callback_fires_after_audio_starts() {
        let dir = tempdir().unwrap();
        let audio = tone_file(dir.path(), 0.2);
        let video = dir.path().join("clip.mp4");

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);

        let mut router = PlaybackRouter::new();
        router.set_on_play_video(Arc::new(move |_url| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        }));
        router
            .play(&video, &audio, ActiveFilter::None, Box::new(NullSink))
            .unwrap();

        assert!(wait_until(Duration::from_secs(5), || !router.is_playing()));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_loop_restarts_with_same_filter() {
        let dir = tempdir().unwrap();
        let audio = tone_file(dir.path(), 0.15);
        let video = dir.path().join("clip.mp4");

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);

        let mut router = PlaybackRouter::new();
        router.set_looping(true);
        router.set_on_play_video(Arc::new(move |_url| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        }));
        router
            .play(
                &video,
                &audio,
                ActiveFilter::new(FilterKind::Alien, 50.0),
                Box::new(NullSink),
            )
            .unwrap();

        // At least two passes, each announcing video playback again
        assert!(wait_until(Duration::from_secs(10), || {
            router.passes_started() >= 2
        }));
        router.stop();

        assert!(fired.load(Ordering::SeqCst) >= 2);
        assert!(!router.is_playing());
    }

    #[test]
    fn test_end_without_loop_stops() {
        let dir = tempdir().unwrap();
        let audio = tone_file(dir.path(), 0.1);
        let video = dir.path().join("clip.mp4");

        let mut router = PlaybackRouter::new();
        router.set_looping(false);
        router
            .play(&video, &audio, ActiveFilter::None, Box::new(NullSink))
            .unwrap();

        assert!(wait_until(Duration::from_secs(5), || !router.is_playing()));
        assert_eq!(router.passes_started(), 1);
    }

    #[test]
    fn test_pause_halts_streaming_and_resume_finishes() {
        let dir = tempdir().unwrap();
        let audio = tone_file(dir.path(), 0.4);
        let video = dir.path().join("clip.mp4");

        let sink = MemorySink::new();
        let writes = sink.writes();

        let mut router = PlaybackRouter::new();
        router
            .play(&video, &audio, ActiveFilter::None, Box::new(sink))
            .unwrap();

        // Let some audio through, then pause
        assert!(wait_until(Duration::from_secs(5), || {
            writes.load(Ordering::SeqCst) > 0
        }));
        router.pause();
        assert!(router.is_paused());

        std::thread::sleep(Duration::from_millis(50));
        let frozen = writes.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(150));
        // One in-flight block may land after the pause
        assert!(writes.load(Ordering::SeqCst) <= frozen + 1);
        assert!(router.is_playing(), "pause must not tear the stream down");

        router.resume();
        assert!(wait_until(Duration::from_secs(5), || !router.is_playing()));
    }

    #[test]
    fn test_stop_interrupts_stream() {
        let dir = tempdir().unwrap();
        let audio = tone_file(dir.path(), 2.0);
        let video = dir.path().join("clip.mp4");

        let sink = MemorySink::new();
        let samples = sink.samples();

        let mut router = PlaybackRouter::new();
        router
            .play(&video, &audio, ActiveFilter::None, Box::new(sink))
            .unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            !samples.lock().unwrap().is_empty()
        }));
        router.stop();

        assert!(!router.is_playing());
        let collected = samples.lock().unwrap().len();
        assert!(collected < (2.0 * 44100.0) as usize);
    }

    #[test]
    fn test_play_missing_audio_fails_synchronously() {
        let dir = tempdir().unwrap();
        let mut router = PlaybackRouter::new();
        let result = router.play(
            &dir.path().join("clip.mp4"),
            &dir.path().join("missing.wav"),
            ActiveFilter::None,
            Box::new(NullSink),
        );
        assert!(result.is_err());
    }
}
