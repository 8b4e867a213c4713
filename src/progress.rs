//! Three-line playback progress bar.
//!
//! ```text
//! +==========================+
//! |>>>>>>>>>>>>>-------------|
//! +====0:01:02/0:02:04=======+
//! ```
//!
//! Every line is `2 * frame_width - BAR_INSET` characters wide so the bar sits
//! flush under the rendered frame without touching the last terminal column.

/// Columns the bar gives up relative to the rendered frame width.
pub const BAR_INSET: usize = 2;

const BORDER_CORNER: char = '+';
const BORDER_EDGE: char = '=';
const BORDER_SIDE: char = '|';
const FILL_DONE: char = '>';
const FILL_LEFT: char = '-';

/// Format whole seconds as `H:MM:SS`.
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, mins, secs)
}

#[derive(Debug, Clone)]
pub struct ProgressIndicator {
    total_frames: Option<u64>,
    total_duration_secs: Option<f64>,
    line_width: usize,
    bar_width: usize,
}

impl ProgressIndicator {
    pub fn new(frame_width: usize, total_frames: Option<u64>, total_duration_secs: Option<f64>) -> Self {
        let line_width = (frame_width * 2).saturating_sub(BAR_INSET);
        Self {
            total_frames: total_frames.filter(|&n| n > 0),
            total_duration_secs: total_duration_secs.filter(|d| d.is_finite() && *d >= 0.0),
            line_width,
            bar_width: line_width.saturating_sub(2),
        }
    }

    /// Number of fill cells between the side borders.
    pub fn bar_width(&self) -> usize {
        self.bar_width
    }

    /// Completion fraction clamped to `[0, 1]`, if the length is known.
    pub fn fraction(&self, frames_emitted: u64) -> Option<f64> {
        self.total_frames
            .map(|total| (frames_emitted as f64 / total as f64).clamp(0.0, 1.0))
    }

    /// `elapsed/total` timestamp, if both the length and the duration are known.
    pub fn timestamp(&self, frames_emitted: u64) -> Option<String> {
        let f = self.fraction(frames_emitted)?;
        let total = self.total_duration_secs?;
        let elapsed = (total * f).round() as u64;
        Some(format!("{}/{}", format_hms(elapsed), format_hms(total.round() as u64)))
    }

    /// The three bar lines, each newline-terminated, or an empty string when
    /// the stream length is unknown or the frame is too narrow for borders.
    pub fn render(&self, frames_emitted: u64) -> String {
        if self.line_width < 2 {
            return String::new();
        }
        let Some(f) = self.fraction(frames_emitted) else {
            return String::new();
        };
        let w = self.bar_width;
        let done = ((w as f64) * f).round() as usize;
        let done = done.min(w);

        let mut out = String::with_capacity((w + 3) * 3);

        out.push(BORDER_CORNER);
        out.extend(std::iter::repeat(BORDER_EDGE).take(w));
        out.push(BORDER_CORNER);
        out.push('\n');

        out.push(BORDER_SIDE);
        out.extend(std::iter::repeat(FILL_DONE).take(done));
        out.extend(std::iter::repeat(FILL_LEFT).take(w - done));
        out.push(BORDER_SIDE);
        out.push('\n');

        out.push(BORDER_CORNER);
        match self.timestamp(frames_emitted).filter(|t| t.len() <= w) {
            Some(text) => {
                let left = (w - text.len()) / 2;
                let right = w - text.len() - left;
                out.extend(std::iter::repeat(BORDER_EDGE).take(left));
                out.push_str(&text);
                out.extend(std::iter::repeat(BORDER_EDGE).take(right));
            }
            None => out.extend(std::iter::repeat(BORDER_EDGE).take(w)),
        }
        out.push(BORDER_CORNER);
        out.push('\n');

        out
    }
}
