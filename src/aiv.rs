//! `.aiv` files: pre-decoded luminance frames on disk.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! b"AIV1" | width: u32 | height: u32 | fps_num: u32 | fps_den: u32 | frame 0 | frame 1 | ...
//! ```
//!
//! Each frame is `width * height` gray bytes. The frame count is implied by
//! the body length, so a file can be written front to back without seeking.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{PlayerError, Result};
use crate::frame::Frame;
use crate::metadata::{self, Overrides, StreamMetadata};
use crate::source::{FrameSource, Pull};
use crate::terminal::CancelFlag;

pub const MAGIC: &[u8; 4] = b"AIV1";
pub const HEADER_LEN: u64 = 20;

/// Denominator used to store fractional frame rates.
const FPS_DEN: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AivHeader {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
}

impl AivHeader {
    pub fn frame_rate(&self) -> f64 {
        f64::from(self.fps_num) / f64::from(self.fps_den)
    }

    pub fn frame_len(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn from_metadata(meta: &StreamMetadata) -> Result<Self> {
        let width = u32::try_from(meta.width).map_err(|_| PlayerError::configuration("frame width too large"))?;
        let height = u32::try_from(meta.height).map_err(|_| PlayerError::configuration("frame height too large"))?;
        let fps_num = (meta.frame_rate * f64::from(FPS_DEN)).round();
        if !(fps_num >= 1.0 && fps_num <= f64::from(u32::MAX)) {
            return Err(PlayerError::configuration(format!(
                "frame rate {} cannot be stored",
                meta.frame_rate
            )));
        }
        Ok(Self {
            width,
            height,
            fps_num: fps_num as u32,
            fps_den: FPS_DEN,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&self.width.to_le_bytes())?;
        w.write_all(&self.height.to_le_bytes())?;
        w.write_all(&self.fps_num.to_le_bytes())?;
        w.write_all(&self.fps_den.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R, path: &Path) -> Result<Self> {
        let invalid = |reason: &str| PlayerError::InvalidAiv {
            path: path.to_path_buf(),
            reason: reason.to_owned(),
        };
        let mut raw = [0u8; HEADER_LEN as usize];
        r.read_exact(&mut raw).map_err(|_| invalid("truncated header"))?;
        if &raw[0..4] != MAGIC {
            return Err(invalid("bad magic"));
        }
        let word = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        let header = Self {
            width: word(4),
            height: word(8),
            fps_num: word(12),
            fps_den: word(16),
        };
        if header.width == 0 || header.height == 0 {
            return Err(invalid("zero frame dimension"));
        }
        if header.fps_num == 0 || header.fps_den == 0 {
            return Err(invalid("zero frame rate"));
        }
        if (header.width as usize).checked_mul(header.height as usize).is_none() {
            return Err(invalid("frame dimensions overflow"));
        }
        Ok(header)
    }
}

/// Plays back an `.aiv` file through the same contract as a live decoder.
pub struct FileFrameSource {
    id: String,
    metadata: StreamMetadata,
    reader: Option<BufReader<File>>,
    /// Whole frames left in the body.
    remaining: u64,
}

impl FileFrameSource {
    /// Open `path`. A frame-rate override changes playback speed; a resolution
    /// override must match the stored frames since they cannot be rescaled.
    pub fn open(path: &Path, overrides: &Overrides) -> Result<Self> {
        let file = File::open(path).map_err(|e| PlayerError::source_unavailable(path.display().to_string(), e.to_string()))?;
        let body_len = file.metadata()?.len().saturating_sub(HEADER_LEN);
        let mut reader = BufReader::new(file);
        let header = AivHeader::read_from(&mut reader, path)?;

        if let Some(res) = overrides.resolution {
            if res.width != header.width as usize || res.height != header.height as usize {
                return Err(PlayerError::configuration(format!(
                    "{} stores {}x{} frames, cannot play at {}",
                    path.display(),
                    header.width,
                    header.height,
                    res
                )));
            }
        }
        if let Some(fps) = overrides.fps {
            metadata::frame_interval_for(fps)?;
        }

        let total_frames = body_len / header.frame_len();
        let metadata = StreamMetadata {
            width: header.width as usize,
            height: header.height as usize,
            frame_rate: overrides.fps.unwrap_or_else(|| header.frame_rate()),
            total_frames: Some(total_frames),
            duration_secs: Some(total_frames as f64 / header.frame_rate()),
        };
        tracing::debug!(path = %path.display(), ?metadata, "opened aiv file");

        Ok(Self {
            id: path.display().to_string(),
            metadata,
            reader: Some(reader),
            remaining: total_frames,
        })
    }
}

impl FrameSource for FileFrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next_frame(&mut self, cancel: &CancelFlag) -> Result<Pull> {
        if cancel.is_cancelled() {
            return Ok(Pull::Cancelled);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Pull::EndOfStream);
        };
        if self.remaining == 0 {
            return Ok(Pull::EndOfStream);
        }
        let mut buf = vec![0u8; self.metadata.frame_len()];
        match reader.read_exact(&mut buf) {
            Ok(()) => {
                self.remaining -= 1;
                Ok(Pull::Frame(Frame::new(self.metadata.width, self.metadata.height, buf)?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(Pull::EndOfStream),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        self.reader.take();
    }
}

/// Drain `source` into an `.aiv` file at `output`, returning the frame count.
///
/// Stops early, keeping what was written, if `cancel` fires.
pub fn encode_aiv<S: FrameSource>(source: &mut S, output: &Path, cancel: &CancelFlag) -> Result<u64> {
    let header = AivHeader::from_metadata(source.metadata())?;
    let file = File::create(output)?;
    let mut w = BufWriter::new(file);
    header.write_to(&mut w)?;

    let mut written = 0u64;
    for frame in source.frames(cancel) {
        let frame = frame?;
        w.write_all(frame.pixels())?;
        written += 1;
    }
    w.flush()?;
    source.close();

    tracing::info!(frames = written, output = %output.display(), "encoded");
    Ok(written)
}

/// Path next to `input` with the `.aiv` extension.
pub fn default_output_path(input: &str) -> PathBuf {
    let stem = Path::new(input)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    PathBuf::from(format!("{}.aiv", stem))
}
