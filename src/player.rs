//! The playback loop.
//!
//! One thread pulls a frame, waits out the rest of the frame interval, draws
//! the frame with its progress bar and status line in a single write, and
//! goes back for the next one. Cancellation is checked between frames; a frame
//! that has started drawing is always finished.

use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{PlayerError, Result};
use crate::frame::FrameRenderer;
use crate::metadata::{Overrides, StreamMetadata};
use crate::progress::ProgressIndicator;
use crate::source::{FrameSource, MediaSource, Pull};
use crate::terminal::{CancelFlag, TerminalSize, CLEAR_SCREEN, CURSOR_HOME, HIDE_CURSOR, SHOW_CURSOR};
use crate::AppConfig;

/// Erase from the cursor to the end of the line.
const CLEAR_TO_EOL: &str = "\x1b[K";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Playing,
    Draining,
    Cancelled,
    Closed,
}

/// How a session that produced a summary came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The source ran out of frames.
    Exhausted,
    /// The source ended before its announced length, or stalled.
    Truncated,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackOptions {
    /// Draw frames as fast as they arrive.
    pub ignore_fps: bool,
    pub show_progress: bool,
    pub show_status: bool,
    /// Clear the screen and hide the cursor for the duration of playback.
    pub manage_screen: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            ignore_fps: false,
            show_progress: true,
            show_status: true,
            manage_screen: true,
        }
    }
}

impl PlaybackOptions {
    pub fn with_ignore_fps(mut self, ignore_fps: bool) -> Self {
        self.ignore_fps = ignore_fps;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_status(mut self, show_status: bool) -> Self {
        self.show_status = show_status;
        self
    }

    pub fn with_screen_management(mut self, manage_screen: bool) -> Self {
        self.manage_screen = manage_screen;
        self
    }
}

/// Per-session counters, reset when a session starts.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackState {
    pub frames_emitted: u64,
    pub started: Instant,
    pub last_frame: Option<Instant>,
}

impl PlaybackState {
    fn start() -> Self {
        Self {
            frames_emitted: 0,
            started: Instant::now(),
            last_frame: None,
        }
    }
}

/// End-of-session report.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSummary {
    pub frames: u64,
    pub elapsed: Duration,
    pub target_fps: f64,
    pub outcome: PlaybackOutcome,
}

impl PlaybackSummary {
    pub fn achieved_fps(&self) -> f64 {
        achieved_fps(self.frames, self.elapsed)
    }
}

impl fmt::Display for PlaybackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let how = match self.outcome {
            PlaybackOutcome::Exhausted => "End of video",
            PlaybackOutcome::Truncated => "Video ended early",
            PlaybackOutcome::Cancelled => "Playback cancelled",
        };
        write!(
            f,
            "{} - {:.2}s, {} frames, {:.2} fps ({} target fps)",
            how,
            self.elapsed.as_secs_f64(),
            self.frames,
            self.achieved_fps(),
            self.target_fps
        )
    }
}

fn achieved_fps(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        frames as f64 / secs
    } else {
        0.0
    }
}

/// Drives a [`FrameSource`] onto a terminal-like sink.
pub struct Player<W: Write> {
    out: W,
    options: PlaybackOptions,
    terminal: Option<TerminalSize>,
    cancel: CancelFlag,
    renderer: FrameRenderer,
    state: SessionState,
}

impl<W: Write> Player<W> {
    pub fn new(out: W, options: PlaybackOptions, terminal: Option<TerminalSize>, cancel: CancelFlag) -> Self {
        Self {
            out,
            options,
            terminal,
            cancel,
            renderer: FrameRenderer::new(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "playback state");
        self.state = next;
    }

    /// Open `input` and play it to the end.
    pub fn open_and_play(&mut self, input: &str, overrides: &Overrides, config: &AppConfig) -> Result<PlaybackSummary> {
        self.transition(SessionState::Opening);
        let mut source = match MediaSource::open(input, overrides, self.terminal, config) {
            Ok(source) => source,
            Err(e) => {
                self.transition(SessionState::Closed);
                return Err(e);
            }
        };
        self.play(&mut source)
    }

    /// Play an already opened source. The source is closed before returning,
    /// on every path.
    pub fn play<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<PlaybackSummary> {
        let meta = source.metadata().clone();
        tracing::info!(
            source = source.id(),
            resolution = %meta.resolution(),
            fps = meta.frame_rate,
            total_frames = ?meta.total_frames,
            "starting playback"
        );

        let mut state = PlaybackState::start();
        self.transition(SessionState::Playing);

        let result = self.begin_screen().and_then(|()| self.run(source, &meta, &mut state));
        source.close();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(SessionState::Closed);
                let _ = self.end_screen();
                tracing::error!(error = %e, frames = state.frames_emitted, "playback failed");
                return Err(e);
            }
        };

        let summary = PlaybackSummary {
            frames: state.frames_emitted,
            elapsed: state.started.elapsed(),
            target_fps: meta.frame_rate,
            outcome,
        };
        self.transition(SessionState::Closed);
        self.end_screen()?;
        writeln!(self.out, "{}", summary)?;
        self.out.flush()?;
        tracing::info!(
            frames = summary.frames,
            elapsed = summary.elapsed.as_secs_f64(),
            achieved_fps = summary.achieved_fps(),
            outcome = ?summary.outcome,
            "playback finished"
        );
        Ok(summary)
    }

    fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        meta: &StreamMetadata,
        state: &mut PlaybackState,
    ) -> Result<PlaybackOutcome> {
        let interval = meta.frame_interval()?;
        let progress = ProgressIndicator::new(meta.width, meta.total_frames, meta.duration_secs);
        let mut screen = String::new();

        loop {
            if self.cancel.is_cancelled() {
                self.transition(SessionState::Cancelled);
                return Ok(PlaybackOutcome::Cancelled);
            }

            let frame = match source.next_frame(&self.cancel)? {
                Pull::Frame(frame) => frame,
                Pull::EndOfStream => {
                    self.transition(SessionState::Draining);
                    return Ok(match meta.total_frames {
                        Some(total) if state.frames_emitted < total => {
                            tracing::warn!(
                                frames = state.frames_emitted,
                                expected = total,
                                "stream ended early"
                            );
                            PlaybackOutcome::Truncated
                        }
                        _ => PlaybackOutcome::Exhausted,
                    });
                }
                Pull::Stalled => {
                    self.transition(SessionState::Draining);
                    return Ok(PlaybackOutcome::Truncated);
                }
                Pull::Cancelled => {
                    self.transition(SessionState::Cancelled);
                    return Ok(PlaybackOutcome::Cancelled);
                }
            };

            if frame.width() != meta.width || frame.height() != meta.height {
                return Err(PlayerError::FrameSizeMismatch {
                    width: meta.width,
                    height: meta.height,
                    expected: meta.frame_len(),
                    actual: frame.pixels().len(),
                });
            }

            if !self.options.ignore_fps {
                if let Some(last) = state.last_frame {
                    let since = last.elapsed();
                    if since < interval {
                        thread::sleep(interval - since);
                    }
                }
            }
            state.last_frame = Some(Instant::now());

            let shown = state.frames_emitted + 1;
            screen.clear();
            screen.push_str(CURSOR_HOME);
            self.renderer.render_into(&frame, &mut screen);
            if self.options.show_progress {
                screen.push_str(&progress.render(shown));
            }
            if self.options.show_status {
                let status = status_line(
                    source.id(),
                    meta,
                    shown,
                    achieved_fps(shown, state.started.elapsed()),
                );
                if self.terminal.is_some_and(|t| t.fits(&status)) {
                    screen.push_str(&status);
                    screen.push_str(CLEAR_TO_EOL);
                }
            }
            self.out.write_all(screen.as_bytes())?;
            self.out.flush()?;
            state.frames_emitted = shown;
        }
    }

    fn begin_screen(&mut self) -> Result<()> {
        if self.options.manage_screen {
            write!(self.out, "{}{}", HIDE_CURSOR, CLEAR_SCREEN)?;
            self.out.flush()?;
        }
        Ok(())
    }

    fn end_screen(&mut self) -> Result<()> {
        if self.options.manage_screen {
            write!(self.out, "{}{}", CLEAR_SCREEN, SHOW_CURSOR)?;
            self.out.flush()?;
        }
        Ok(())
    }
}

/// One-line footer under the progress bar.
pub fn status_line(id: &str, meta: &StreamMetadata, frame: u64, fps: f64) -> String {
    format!(
        "Video from {}, resolution: {}x{}px ({}x{}char), frame {}, {:.2}fps",
        id,
        meta.width,
        meta.height,
        meta.width * 2,
        meta.height,
        frame,
        fps
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    struct Counted {
        meta: StreamMetadata,
        left: u64,
        closes: u32,
    }

    impl Counted {
        fn new(frames: u64, total: Option<u64>) -> Self {
            Self {
                meta: StreamMetadata {
                    width: 3,
                    height: 2,
                    frame_rate: 1000.0,
                    total_frames: total,
                    duration_secs: None,
                },
                left: frames,
                closes: 0,
            }
        }
    }

    impl FrameSource for Counted {
        fn id(&self) -> &str {
            "counted"
        }

        fn metadata(&self) -> &StreamMetadata {
            &self.meta
        }

        fn next_frame(&mut self, _cancel: &CancelFlag) -> Result<Pull> {
            if self.left == 0 {
                return Ok(Pull::EndOfStream);
            }
            self.left -= 1;
            Ok(Pull::Frame(Frame::new(3, 2, vec![0; 6])?))
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn quiet() -> PlaybackOptions {
        PlaybackOptions::default().with_screen_management(false)
    }

    #[test]
    fn summary_reports_announced_length_shortfall() {
        let mut source = Counted::new(4, Some(10));
        let mut player = Player::new(Vec::new(), quiet(), None, CancelFlag::new());
        let summary = player.play(&mut source).unwrap();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.outcome, PlaybackOutcome::Truncated);
        assert_eq!(source.closes, 1);
        assert_eq!(player.state(), SessionState::Closed);
    }

    #[test]
    fn each_frame_starts_with_cursor_home() {
        let mut source = Counted::new(3, None);
        let mut player = Player::new(Vec::new(), quiet(), None, CancelFlag::new());
        player.play(&mut source).unwrap();
        let out = String::from_utf8(player.into_inner()).unwrap();
        assert_eq!(out.matches(CURSOR_HOME).count(), 3);
        assert!(out.ends_with("target fps)\n"));
    }

    #[test]
    fn status_line_only_when_it_fits() {
        let mut source = Counted::new(1, None);
        let narrow = Some(TerminalSize::new(10, 10));
        let mut player = Player::new(Vec::new(), quiet(), narrow, CancelFlag::new());
        player.play(&mut source).unwrap();
        let out = String::from_utf8(player.into_inner()).unwrap();
        assert!(!out.contains("Video from"));

        let mut source = Counted::new(1, None);
        let wide = Some(TerminalSize::new(200, 50));
        let mut player = Player::new(Vec::new(), quiet(), wide, CancelFlag::new());
        player.play(&mut source).unwrap();
        let out = String::from_utf8(player.into_inner()).unwrap();
        assert!(out.contains("Video from counted, resolution: 3x2px (6x2char), frame 1,"));
    }

    #[test]
    fn managed_screen_hides_and_restores_cursor() {
        let mut source = Counted::new(1, None);
        let mut player = Player::new(Vec::new(), PlaybackOptions::default(), None, CancelFlag::new());
        player.play(&mut source).unwrap();
        let out = String::from_utf8(player.into_inner()).unwrap();
        assert!(out.starts_with(HIDE_CURSOR));
        assert!(out.contains(SHOW_CURSOR));
    }

    #[test]
    fn pre_cancelled_session_emits_nothing() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut source = Counted::new(5, None);
        let mut player = Player::new(Vec::new(), quiet(), None, cancel);
        let summary = player.play(&mut source).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.outcome, PlaybackOutcome::Cancelled);
        assert_eq!(source.closes, 1);
    }

    #[test]
    fn summary_text() {
        let summary = PlaybackSummary {
            frames: 50,
            elapsed: Duration::from_secs(2),
            target_fps: 25.0,
            outcome: PlaybackOutcome::Exhausted,
        };
        assert_eq!(summary.achieved_fps(), 25.0);
        assert_eq!(summary.to_string(), "End of video - 2.00s, 50 frames, 25.00 fps (25 target fps)");
    }
}
