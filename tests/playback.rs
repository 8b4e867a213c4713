use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use asciiplay::progress::ProgressIndicator;
use asciiplay::{
    CancelFlag, Frame, FrameRenderer, FrameSource, PlaybackOptions, PlaybackOutcome, Player, Pull, Result,
    StreamMetadata, TerminalSize,
};

/// In-memory source producing `limit` frames (or unlimited) of a fixed pattern.
struct Scripted {
    meta: StreamMetadata,
    limit: Option<u64>,
    dequeued: Arc<AtomicU64>,
    cancel_after: Option<(u64, CancelFlag)>,
    closes: u32,
}

impl Scripted {
    fn new(width: usize, height: usize, fps: f64, limit: Option<u64>, total: Option<u64>) -> Self {
        Self {
            meta: StreamMetadata {
                width,
                height,
                frame_rate: fps,
                total_frames: total,
                duration_secs: None,
            },
            limit,
            dequeued: Arc::new(AtomicU64::new(0)),
            cancel_after: None,
            closes: 0,
        }
    }
}

impl FrameSource for Scripted {
    fn id(&self) -> &str {
        "scripted"
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.meta
    }

    fn next_frame(&mut self, cancel: &CancelFlag) -> Result<Pull> {
        if cancel.is_cancelled() {
            return Ok(Pull::Cancelled);
        }
        let n = self.dequeued.load(Ordering::SeqCst);
        if self.limit.is_some_and(|l| n >= l) {
            return Ok(Pull::EndOfStream);
        }
        let n = self.dequeued.fetch_add(1, Ordering::SeqCst) + 1;
        // Interrupt arrives while this frame is in flight.
        if let Some((after, flag)) = &self.cancel_after {
            if n == *after {
                flag.cancel();
            }
        }
        let pixels = (0..self.meta.frame_len()).map(|i| (i * 40 % 256) as u8).collect();
        Ok(Pull::Frame(Frame::new(self.meta.width, self.meta.height, pixels)?))
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

fn quiet() -> PlaybackOptions {
    PlaybackOptions::default().with_screen_management(false)
}

#[test]
fn pacing_holds_frames_to_the_target_rate() {
    let fps = 50.0;
    let n = 6u64;
    let mut source = Scripted::new(4, 2, fps, Some(n), None);
    let mut player = Player::new(Vec::new(), quiet(), None, CancelFlag::new());

    let started = Instant::now();
    let summary = player.play(&mut source).unwrap();
    let wall = started.elapsed();

    assert_eq!(summary.frames, n);
    let floor = Duration::from_secs_f64((n - 1) as f64 / fps);
    assert!(wall >= floor, "{:?} < {:?}", wall, floor);
}

#[test]
fn ignore_fps_does_not_throttle() {
    let mut source = Scripted::new(4, 2, 1.0, Some(5), None);
    let options = quiet().with_ignore_fps(true);
    let mut player = Player::new(Vec::new(), options, None, CancelFlag::new());

    let started = Instant::now();
    let summary = player.play(&mut source).unwrap();
    assert_eq!(summary.frames, 5);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn unknown_length_stream_of_ten_buffers() {
    let mut source = Scripted::new(3, 3, 1000.0, Some(10), None);
    let mut player = Player::new(Vec::new(), quiet(), Some(TerminalSize::new(120, 40)), CancelFlag::new());
    let summary = player.play(&mut source).unwrap();

    assert_eq!(summary.frames, 10);
    assert_eq!(summary.outcome, PlaybackOutcome::Exhausted);
    assert_eq!(source.closes, 1);

    let out = String::from_utf8(player.into_inner()).unwrap();
    assert!(out.contains("10 frames"));
    // No bar when the length is unknown.
    assert!(!out.contains("|>"));
    assert!(!out.contains("+="));
}

#[test]
fn cancellation_between_frames_stops_cleanly() {
    let cancel = CancelFlag::new();
    let mut source = Scripted::new(5, 2, 1000.0, None, None);
    source.cancel_after = Some((3, cancel.clone()));
    let dequeued = Arc::clone(&source.dequeued);

    let mut player = Player::new(Vec::new(), quiet(), None, cancel);
    let summary = player.play(&mut source).unwrap();

    assert_eq!(summary.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(summary.frames, 3);
    assert!(summary.frames <= dequeued.load(Ordering::SeqCst));
    assert_eq!(source.closes, 1);

    let out = String::from_utf8(player.into_inner()).unwrap();
    assert!(out.trim_end().ends_with("target fps)"));
    assert!(out.contains("Playback cancelled"));
}

#[test]
fn cancellation_from_another_thread_never_overcounts() {
    let cancel = CancelFlag::new();
    let mut source = Scripted::new(4, 4, 100.0, None, None);
    let dequeued = Arc::clone(&source.dequeued);

    let trigger = cancel.clone();
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(120));
        trigger.cancel();
    });

    let mut player = Player::new(Vec::new(), quiet(), None, cancel);
    let summary = player.play(&mut source).unwrap();
    t.join().unwrap();

    assert_eq!(summary.outcome, PlaybackOutcome::Cancelled);
    assert!(summary.frames <= dequeued.load(Ordering::SeqCst));
}

#[test]
fn frames_are_drawn_whole_with_the_bar_underneath() {
    let mut source = Scripted::new(20, 3, 1000.0, Some(50), Some(100));
    source.meta.duration_secs = Some(4.0);
    let mut player = Player::new(Vec::new(), quiet(), None, CancelFlag::new());
    let summary = player.play(&mut source).unwrap();
    assert_eq!(summary.outcome, PlaybackOutcome::Truncated);

    let out = String::from_utf8(player.into_inner()).unwrap();
    let last = out.rsplit("\x1b[H").next().unwrap();

    let frame = Frame::new(20, 3, (0..60).map(|i| (i * 40 % 256) as u8).collect()).unwrap();
    let expected_frame = FrameRenderer::new().render_to_string(&frame);
    assert!(last.starts_with(&expected_frame));

    let bar = ProgressIndicator::new(20, Some(100), Some(4.0)).render(50);
    assert!(last[expected_frame.len()..].starts_with(&bar));
    let middle = bar.lines().nth(1).unwrap();
    let filled = middle.chars().filter(|&c| c == '>').count();
    assert_eq!(filled, (ProgressIndicator::new(20, Some(100), None).bar_width() as f64 * 0.5).round() as usize);
    assert!(bar.contains("0:00:02/0:00:04"));
}

#[cfg(unix)]
mod live {
    use super::*;
    use asciiplay::source::DecoderProcess;
    use asciiplay::LiveFrameSource;
    use std::process::Command;

    fn meta(width: usize, height: usize, fps: f64) -> StreamMetadata {
        StreamMetadata {
            width,
            height,
            frame_rate: fps,
            total_frames: None,
            duration_secs: None,
        }
    }

    #[test]
    fn decoder_ending_after_ten_buffers_is_not_an_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "head -c 120 /dev/zero"]);
        let decoder = DecoderProcess::spawn(cmd).unwrap();
        let mut source = LiveFrameSource::from_decoder("zeros", meta(4, 3, 1000.0), decoder, None).unwrap();

        let mut player = Player::new(Vec::new(), quiet(), None, CancelFlag::new());
        let summary = player.play(&mut source).unwrap();
        assert_eq!(summary.frames, 10);
        assert_eq!(summary.outcome, PlaybackOutcome::Exhausted);
        assert!(!source.is_decoder_running());
    }

    #[test]
    fn cancelling_kills_an_endless_decoder() {
        let mut cmd = Command::new("cat");
        cmd.arg("/dev/zero");
        let decoder = DecoderProcess::spawn(cmd).unwrap();
        let mut source = LiveFrameSource::from_decoder("endless", meta(4, 3, 50.0), decoder, None).unwrap();
        assert!(source.is_decoder_running());

        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            trigger.cancel();
        });

        let mut player = Player::new(Vec::new(), quiet(), None, cancel);
        let summary = player.play(&mut source).unwrap();
        t.join().unwrap();

        assert_eq!(summary.outcome, PlaybackOutcome::Cancelled);
        assert!(!source.is_decoder_running());
    }

    #[test]
    fn silent_decoder_counts_as_truncated_after_stall_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let decoder = DecoderProcess::spawn(cmd).unwrap();
        let mut source = LiveFrameSource::from_decoder(
            "silent",
            meta(4, 3, 25.0),
            decoder,
            Some(Duration::from_millis(100)),
        )
        .unwrap();

        let mut player = Player::new(Vec::new(), quiet(), None, CancelFlag::new());
        let summary = player.play(&mut source).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.outcome, PlaybackOutcome::Truncated);
        assert!(!source.is_decoder_running());
    }
}
