//! Command handlers

use std::path::{Path, PathBuf};

use log::info;
use serde_json::json;

use crate::dsp::{ActiveFilter, FilterKind};
use crate::engine::render::OfflineRenderer;
use crate::error::Result;
use crate::media::extract::extract_audio;
use crate::media::mux::{merge_job, FfmpegMuxer};
use crate::media::MediaAsset;
use crate::playback::NullSink;
use crate::session::{Session, StoragePaths};

/// Resolve the filter argument pair into a selection
fn filter_from_args(kind: FilterKind, level: Option<f32>) -> ActiveFilter {
    ActiveFilter::new(kind, level.unwrap_or_else(|| kind.default_level()))
}

pub fn probe(input: &Path) -> Result<()> {
    let asset = MediaAsset::open(input)?;
    let track = asset.audio_track();

    let report = json!({
        "path": asset.path().display().to_string(),
        "audio_track": {
            "track_id": track.track_id,
            "sample_rate": track.sample_rate,
            "channels": track.channels,
            "frames": track.n_frames,
            "duration_secs": track.duration_secs,
        },
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("report serializes")
    );
    Ok(())
}

pub fn extract(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from("extracted_audio.wav"));
    let path = extract_audio(input, &output)?;
    println!("{}", path.display());
    Ok(())
}

pub fn render(
    input: &Path,
    kind: FilterKind,
    level: Option<f32>,
    output: Option<PathBuf>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from("filtered_audio.wav"));
    let filter = filter_from_args(kind, level);

    let mut renderer = OfflineRenderer::new();
    renderer.load(input)?;
    let path = renderer.render(filter, &output)?;
    println!("{}", path.display());
    Ok(())
}

pub fn merge(video: &Path, audio: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from("merged_video.mp4"));
    let job = merge_job(
        std::sync::Arc::new(FfmpegMuxer::new()),
        video.to_path_buf(),
        audio.to_path_buf(),
        output,
    );
    let path = job.wait()?;
    println!("{}", path.display());
    Ok(())
}

pub fn share(
    video: &Path,
    kind: FilterKind,
    level: Option<f32>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let storage = StoragePaths::new(
        std::env::temp_dir(),
        output_dir.unwrap_or_else(|| PathBuf::from(".")),
    );

    let mut session = Session::new(storage);
    session.select_video(video);
    session.select_filter(kind);
    if let Some(level) = level {
        session.set_filter_level(kind, level);
    }

    let path = session.prepare_for_share()?;
    let stats = session.stats();
    info!(
        "pipeline done: {} extraction(s), {} render(s), {} mux(es)",
        stats.extractions, stats.renders, stats.muxes
    );
    println!("{}", path.display());
    Ok(())
}

pub fn play(video: &Path, kind: FilterKind, level: Option<f32>, looping: bool) -> Result<()> {
    let mut session = Session::new(StoragePaths::default_locations());

    #[cfg(feature = "device-playback")]
    session.set_sink_factory(Box::new(|| {
        match crate::playback::DeviceSink::try_new() {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                log::warn!("audio device unavailable ({}), playing silent", e);
                Box::new(NullSink)
            }
        }
    }));
    #[cfg(not(feature = "device-playback"))]
    {
        info!("built without device-playback; streaming to a silent sink");
        session.set_sink_factory(Box::new(|| Box::new(NullSink)));
    }

    session.set_on_play_video(std::sync::Arc::new(|url| {
        println!("video: {}", url.display());
    }));
    session.set_looping(looping);
    session.select_filter(kind);
    if let Some(level) = level {
        session.set_filter_level(kind, level);
    }

    session.start_playback(video)?;
    // Loop restarts happen inside the router; this just outlives the stream
    while session.is_playing() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    Ok(())
}
