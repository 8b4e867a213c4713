//! Luminance frames and their text rendering.

use std::io::{self, Write};

use crate::error::{PlayerError, Result};
use crate::glyph::char_for;

/// One decoded image: a row-major grid of 8-bit luminance samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wrap a buffer, checking that it holds exactly `width * height` samples.
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        let expected = width * height;
        if pixels.len() != expected {
            return Err(PlayerError::FrameSizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Samples of row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }
}

/// Converts frames to text, doubling every glyph horizontally.
///
/// Each rendered line is `2 * width` characters followed by `\n`. The
/// in-memory and streaming paths share [`FrameRenderer::push_row`], so a frame
/// written to a file is byte-identical to the same frame printed live.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameRenderer;

impl FrameRenderer {
    pub fn new() -> Self {
        Self
    }

    fn push_row(line: &mut String, row: &[u8]) {
        for &sample in row {
            let ch = char_for(sample);
            line.push(ch);
            line.push(ch);
        }
    }

    /// Rendered lines without trailing newlines.
    pub fn render_lines(&self, frame: &Frame) -> Vec<String> {
        (0..frame.height())
            .map(|y| {
                let mut line = String::with_capacity(frame.width() * 2);
                Self::push_row(&mut line, frame.row(y));
                line
            })
            .collect()
    }

    /// Append the whole frame, newline-terminated lines, to `out`.
    pub fn render_into(&self, frame: &Frame, out: &mut String) {
        out.reserve((frame.width() * 2 + 1) * frame.height());
        for y in 0..frame.height() {
            Self::push_row(out, frame.row(y));
            out.push('\n');
        }
    }

    pub fn render_to_string(&self, frame: &Frame) -> String {
        let mut out = String::new();
        self.render_into(frame, &mut out);
        out
    }

    /// Stream the frame to `sink` one line at a time, reusing a single row buffer.
    pub fn write_to<W: Write + ?Sized>(&self, frame: &Frame, sink: &mut W) -> io::Result<()> {
        let mut line = String::with_capacity(frame.width() * 2 + 1);
        for y in 0..frame.height() {
            line.clear();
            Self::push_row(&mut line, frame.row(y));
            line.push('\n');
            sink.write_all(line.as_bytes())?;
        }
        Ok(())
    }
}
