//! Voco CLI - voice filter pipeline
//!
//! Command-line interface over the Voco library.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use voco::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Voco v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Probe { input } => {
            commands::probe(&input).with_context(|| format!("probing {}", input.display()))
        }
        Commands::Extract { input, output } => commands::extract(&input, output)
            .with_context(|| format!("extracting audio from {}", input.display())),
        Commands::Render {
            input,
            filter,
            level,
            output,
        } => {
            info!("rendering {} with {:?}", input.display(), filter);
            commands::render(&input, filter, level, output)
                .with_context(|| format!("rendering {}", input.display()))
        }
        Commands::Merge {
            video,
            audio,
            output,
        } => commands::merge(&video, &audio, output)
            .with_context(|| format!("merging {} + {}", video.display(), audio.display())),
        Commands::Share {
            video,
            filter,
            level,
            output_dir,
        } => commands::share(&video, filter, level, output_dir)
            .with_context(|| format!("preparing {} for share", video.display())),
        Commands::Play {
            video,
            filter,
            level,
            looping,
        } => commands::play(&video, filter, level, looping)
            .with_context(|| format!("playing {}", video.display())),
    }
}
