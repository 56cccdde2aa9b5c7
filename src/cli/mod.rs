//! Command-line interface definitions

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::dsp::FilterKind;

/// Voice filter pipeline CLI
#[derive(Parser)]
#[command(name = "voco-cli", version, about = "Voice filter pipeline: extract, render and remux")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect a container's first audio track
    Probe {
        /// Input video or audio container
        input: PathBuf,
    },

    /// Extract the audio track to a WAV file
    Extract {
        /// Input video container
        input: PathBuf,
        /// Output WAV path (default: extracted_audio.wav)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render an audio file offline through a filter
    Render {
        /// Input WAV file
        input: PathBuf,
        /// Filter to apply
        #[arg(short, long, value_parser = parse_filter, default_value = "none")]
        filter: FilterKind,
        /// Filter intensity, 0-100
        #[arg(short, long)]
        level: Option<f32>,
        /// Output WAV path (default: filtered_audio.wav)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a video stream with an audio file (requires ffmpeg)
    Merge {
        /// Input video container
        video: PathBuf,
        /// Input audio file
        audio: PathBuf,
        /// Output container path (default: merged_video.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full pipeline: extract, render and merge for sharing
    Share {
        /// Input video container
        video: PathBuf,
        /// Filter to apply
        #[arg(short, long, value_parser = parse_filter, default_value = "none")]
        filter: FilterKind,
        /// Filter intensity, 0-100 (default: the filter's own default)
        #[arg(short, long)]
        level: Option<f32>,
        /// Directory for persistent outputs (default: current dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Preview playback with a live filter
    Play {
        /// Input video container
        video: PathBuf,
        /// Filter to apply
        #[arg(short, long, value_parser = parse_filter, default_value = "none")]
        filter: FilterKind,
        /// Filter intensity, 0-100 (default: the filter's own default)
        #[arg(short, long)]
        level: Option<f32>,
        /// Restart from zero at end of media
        #[arg(long)]
        looping: bool,
    },
}

/// Parse a filter kind argument
fn parse_filter(s: &str) -> Result<FilterKind, String> {
    FilterKind::from_str(s).ok_or_else(|| {
        format!(
            "unknown filter '{}' (expected high-pitch, low-pitch, alien, reverb or none)",
            s
        )
    })
}
