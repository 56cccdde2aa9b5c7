//! Error handling for Voco
//!
//! One taxonomy for the whole pipeline. Async jobs deliver these through
//! their result channels, so every terminal state is observable.

use thiserror::Error;

/// Result type alias for Voco operations
pub type Result<T> = std::result::Result<T, VocoError>;

/// Main error type for Voco operations
#[derive(Error, Debug)]
pub enum VocoError {
    // Media errors
    #[error("No audio track in {path}")]
    NoAudioTrack { path: String },

    #[error("No video track in {path}")]
    NoVideoTrack { path: String },

    #[error("Unreadable or unsupported media: {reason}")]
    InvalidMedia {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Render errors
    #[error("No source audio loaded for rendering")]
    NoSourceLoaded,

    #[error("Offline render failed: {reason}")]
    RenderFailed { reason: String },

    #[error("A render is already in flight")]
    RenderInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    // Export errors
    #[error("Export failed: {reason}")]
    ExportFailed { reason: String },

    // File system errors that are not best-effort cleanup
    #[error("File system error at {path}: {reason}")]
    FileSystem { path: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VocoError {
    /// Get the stable error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            VocoError::NoAudioTrack { .. } => "NO_AUDIO_TRACK",
            VocoError::NoVideoTrack { .. } => "NO_VIDEO_TRACK",
            VocoError::InvalidMedia { .. } => "INVALID_MEDIA",
            VocoError::NoSourceLoaded => "NO_SOURCE_LOADED",
            VocoError::RenderFailed { .. } => "RENDER_FAILED",
            VocoError::RenderInProgress => "RENDER_IN_PROGRESS",
            VocoError::Cancelled => "CANCELLED",
            VocoError::ExportFailed { .. } => "EXPORT_FAILED",
            VocoError::FileSystem { .. } => "FILE_SYSTEM",
            VocoError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if this error is recoverable by retrying with different input
    pub fn is_recoverable(&self) -> bool {
        match self {
            VocoError::NoAudioTrack { .. } => true,
            VocoError::NoVideoTrack { .. } => true,
            VocoError::InvalidMedia { .. } => true,
            VocoError::RenderInProgress => true,
            VocoError::Cancelled => true,
            _ => false,
        }
    }
}
