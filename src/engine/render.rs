//! Offline renderer
//!
//! Pulls a loaded source file through a freshly built effects chain in
//! fixed-size blocks, faster than real time, and writes the processed
//! result to a destination WAV. Output is staged beside the destination
//! and only renamed into place on success, so a failed or cancelled render
//! never leaves partial output at the destination path.
//!
//! Each call builds its own `RenderSession`; nothing is carried over
//! between renders or shared with playback.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use uuid::Uuid;

use crate::dsp::{ActiveFilter, EffectsChain};
use crate::engine::buffer::AudioBuffer;
use crate::engine::io::{import_wav, BlockWriter};
use crate::error::{Result, VocoError};

/// Fixed render block size in frames
pub const RENDER_BLOCK_FRAMES: usize = 4096;

/// Render configuration
///
/// The default matches the fixed block size; tests use other values to
/// exercise failure paths.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Frames pulled through the chain per iteration
    pub block_frames: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            block_frames: RENDER_BLOCK_FRAMES,
        }
    }
}

/// Transient state for one render invocation
struct RenderSession {
    id: Uuid,
    chain: EffectsChain,
    staged_path: PathBuf,
    frames_rendered: usize,
    total_frames: usize,
}

/// Offline audio renderer
///
/// Holds the loaded source between renders; everything else is
/// per-invocation.
pub struct OfflineRenderer {
    source: Option<AudioBuffer>,
    source_path: Option<PathBuf>,
}

impl OfflineRenderer {
    /// Create a renderer with no source loaded
    pub fn new() -> Self {
        Self {
            source: None,
            source_path: None,
        }
    }

    /// Load the source audio file to be rendered
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let buffer = import_wav(path)?;
        debug!(
            "loaded render source {} ({} frames @ {} Hz)",
            path.display(),
            buffer.num_frames(),
            buffer.sample_rate()
        );
        self.source = Some(buffer);
        self.source_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Drop the loaded source
    pub fn unload(&mut self) {
        self.source = None;
        self.source_path = None;
    }

    /// True if a source file has been loaded
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Path of the loaded source, if any
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Render the loaded source through `filter` to `output`
    ///
    /// Blocking; run it on a worker, not the interactive thread.
    pub fn render(&self, filter: ActiveFilter, output: &Path) -> Result<PathBuf> {
        self.render_with_config(filter, output, &RenderConfig::default(), None)
    }

    /// Render with explicit configuration and an optional cancel flag
    ///
    /// The flag is checked between blocks; when it flips the staged output
    /// is discarded and the call returns `Cancelled`.
    pub fn render_with_config(
        &self,
        filter: ActiveFilter,
        output: &Path,
        config: &RenderConfig,
        cancel: Option<&AtomicBool>,
    ) -> Result<PathBuf> {
        let source = self.source.as_ref().ok_or(VocoError::NoSourceLoaded)?;

        // The mode-switch analog: an unusable block size means the render
        // loop can never run, rejected before anything is staged.
        if config.block_frames == 0 {
            return Err(VocoError::RenderFailed {
                reason: "render block size must be non-zero".to_string(),
            });
        }

        let mut session = RenderSession {
            id: Uuid::new_v4(),
            chain: EffectsChain::new(),
            staged_path: staged_path_for(output),
            frames_rendered: 0,
            total_frames: source.num_frames(),
        };

        info!(
            "render {} starting: {} frames, filter {:?}, block {}",
            session.id, session.total_frames, filter, config.block_frames
        );

        // Stale output from an earlier run is replaced; removal failures
        // are best-effort because the rename below overwrites anyway.
        let _ = std::fs::remove_file(output);
        let _ = std::fs::remove_file(&session.staged_path);

        session.chain.apply(filter);
        session
            .chain
            .prepare(source.sample_rate(), config.block_frames);

        let mut writer = BlockWriter::create(
            &session.staged_path,
            source.num_channels() as u16,
            source.sample_rate(),
        )?;

        while session.frames_rendered < session.total_frames {
            if let Some(flag) = cancel {
                if flag.load(Ordering::SeqCst) {
                    drop(writer);
                    let _ = std::fs::remove_file(&session.staged_path);
                    info!("render {} cancelled at frame {}", session.id, session.frames_rendered);
                    return Err(VocoError::Cancelled);
                }
            }

            let remaining = session.total_frames - session.frames_rendered;
            let frames_to_render = config.block_frames.min(remaining);

            let mut block = source.slice(session.frames_rendered, frames_to_render);
            session.chain.process(&mut block);

            if let Err(e) = writer.write_block(&block) {
                drop(writer);
                let _ = std::fs::remove_file(&session.staged_path);
                return Err(e);
            }

            session.frames_rendered += frames_to_render;
        }

        if let Err(e) = writer.finalize() {
            let _ = std::fs::remove_file(&session.staged_path);
            return Err(e);
        }

        std::fs::rename(&session.staged_path, output).map_err(|e| {
            let _ = std::fs::remove_file(&session.staged_path);
            VocoError::FileSystem {
                path: output.display().to_string(),
                reason: format!("failed to move rendered file into place: {}", e),
            }
        })?;

        info!(
            "render {} finished: {} frames -> {}",
            session.id,
            session.frames_rendered,
            output.display()
        );
        Ok(output.to_path_buf())
    }
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Staging path beside the destination
fn staged_path_for(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "render".into());
    name.push(".part");
    output.with_file_name(name)
}

// ============================================================================
// Tests
// ============================================================================
