//! Error types for playback, conversion and encoding.

use std::path::PathBuf;

/// Errors that can abort a playback, conversion or encoding session.
///
/// A decoder that dies early or a user interrupt is not an error; it shows up
/// as a [`crate::PlaybackOutcome`]. Unparseable probe output leaves metadata
/// fields as `None`.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("source unavailable: {source_id}: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("failed to start decoder '{program}': {reason}")]
    DecoderSpawn { program: String, reason: String },

    #[error("frame buffer holds {actual} bytes, expected {width}x{height} = {expected}")]
    FrameSizeMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("invalid .aiv file {path}: {reason}")]
    InvalidAiv { path: PathBuf, reason: String },

    #[error("invalid config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PlayerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn source_unavailable(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// True for the failures a user is expected to fix: a missing or invalid
    /// input, or a session whose playback geometry cannot be determined.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::SourceUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
