//! # asciiplay - character-art video player
//!
//! `asciiplay` plays video in a terminal as character art. Frames come from an
//! external `ffmpeg` decoder as raw 8-bit gray buffers (or from a pre-decoded
//! `.aiv` file), each pixel becomes a pair of glyphs, and frames are paced to
//! the stream's frame rate under a progress bar and a status line.
//!
//! ## Features
//!
//! - Live playback of anything `ffmpeg` can decode, files or URLs
//! - Frame pacing without drift, or as fast as possible
//! - Ctrl-C stops playback cleanly and still prints a summary
//! - Still images (PNG, JPEG) converted to text files or printed
//! - Encoding a decoded stream into an `.aiv` file for later playback
//!
//! ## Example
//!
//! ```no_run
//! use asciiplay::{AppConfig, CancelFlag, Overrides, PlaybackOptions, Player, TerminalSize};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let cancel = CancelFlag::new();
//! cancel.install_interrupt_handler()?;
//!
//! let mut player = Player::new(
//!     std::io::stdout(),
//!     PlaybackOptions::default(),
//!     TerminalSize::detect(),
//!     cancel,
//! );
//! let summary = player.open_and_play("clip.mp4", &Overrides::default(), &config)?;
//! eprintln!("{} frames", summary.frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## Rendering a single frame
//!
//! ```
//! use asciiplay::{Frame, FrameRenderer};
//!
//! let frame = Frame::new(2, 1, vec![0, 255]).unwrap();
//! assert_eq!(FrameRenderer::new().render_to_string(&frame), "##  \n");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod aiv;
pub mod convert;
pub mod error;
pub mod frame;
pub mod glyph;
pub mod metadata;
pub mod player;
pub mod probe;
pub mod progress;
pub mod source;
pub mod terminal;

pub use aiv::{encode_aiv, FileFrameSource};
pub use error::{PlayerError, Result};
pub use frame::{Frame, FrameRenderer};
pub use metadata::{Overrides, Resolution, StreamMetadata};
pub use player::{PlaybackOptions, PlaybackOutcome, PlaybackSummary, Player, SessionState};
pub use probe::ProbeInfo;
pub use progress::ProgressIndicator;
pub use source::{FrameSource, LiveFrameSource, MediaSource, Pull};
pub use terminal::{CancelFlag, TerminalSize};

/// Represents the current phase of a batch image conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Converting images to character art
    ConvertingImages,
    /// Conversion completed successfully
    Complete,
}

/// Progress information for batch conversions
///
/// This struct provides detailed progress information that can be used
/// to display progress in UI applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the conversion
    pub phase: ProgressPhase,
    /// Number of items completed in the current phase
    pub completed: usize,
    /// Total number of items in the current phase
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    /// Create a new progress update for image conversion
    pub fn converting_images(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::ConvertingImages,
            completed,
            total,
            percentage,
            message: format!("Converting image {} of {}", completed, total),
        }
    }

    /// Create a completion progress update
    pub fn complete(total: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total,
            total,
            percentage: 100.0,
            message: format!("Conversion complete: {} images", total),
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_fallback_fps() -> Option<f64> {
    Some(25.0)
}

fn default_stall_timeout() -> Option<f64> {
    Some(10.0)
}

fn default_true() -> bool {
    true
}

fn default_image_max_width() -> u32 {
    424
}

fn default_image_max_height() -> u32 {
    140
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Decoder executable
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    /// Metadata prober executable
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    /// Frame rate used when none is given or probed; `null` makes that an error
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: Option<f64>,
    /// Seconds to wait for a decoder buffer before giving up; `null` waits forever
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: Option<f64>,
    #[serde(default = "default_true")]
    pub show_progress: bool,
    #[serde(default = "default_true")]
    pub show_status: bool,
    /// Widest still-image output, in characters
    #[serde(default = "default_image_max_width")]
    pub image_max_width: u32,
    /// Tallest still-image output, in rows
    #[serde(default = "default_image_max_height")]
    pub image_max_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            fallback_fps: default_fallback_fps(),
            stall_timeout_secs: default_stall_timeout(),
            show_progress: true,
            show_status: true,
            image_max_width: default_image_max_width(),
            image_max_height: default_image_max_height(),
        }
    }
}

impl AppConfig {
    /// Bounded wait for decoder output, `None` to wait forever
    pub fn stall_timeout(&self) -> Result<Option<Duration>> {
        let Some(secs) = self.stall_timeout_secs else {
            return Ok(None);
        };
        if !(secs.is_finite() && secs > 0.0) {
            return Err(PlayerError::configuration(format!(
                "stall timeout must be positive, got {}",
                secs
            )));
        }
        Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|_| PlayerError::configuration(format!("stall timeout {} is too large", secs)))
    }

    /// Create config with a specific stall timeout
    pub fn with_stall_timeout(mut self, secs: Option<f64>) -> Self {
        self.stall_timeout_secs = secs;
        self
    }

    /// Load configuration from a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let invalid = |reason: String| PlayerError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let is_toml = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let config: Self = if is_toml {
            toml::from_str(&text).map_err(|e| invalid(e.to_string()))?
        } else {
            serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?
        };
        config.validate().map_err(invalid)?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(fps) = self.fallback_fps {
            metadata::frame_interval_for(fps).map_err(|e| format!("fallback_fps: {}", e))?;
        }
        self.stall_timeout()
            .map_err(|e| format!("stall_timeout_secs: {}", e))?;
        if self.image_max_width < 2 || self.image_max_height < 1 {
            return Err("image bounds must be at least 2x1".to_string());
        }
        Ok(())
    }

    /// Candidate config files, highest priority first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(mut d) = dirs::data_dir() {
            d.push("asciiplay");
            d.push("asciiplay.json");
            tried.push(d);
        }
        if let Some(mut d) = dirs::config_dir() {
            d.push("asciiplay");
            d.push("asciiplay.toml");
            tried.push(d);
        }
        tried.push(PathBuf::from("asciiplay.json"));
        tried
    }

    /// Load the first config file found, or the built-in defaults
    pub fn load() -> Result<Self> {
        for p in Self::search_paths() {
            if p.exists() {
                tracing::debug!(path = %p.display(), "loading config");
                return Self::from_file(&p);
            }
        }
        Ok(Self::default())
    }
}
