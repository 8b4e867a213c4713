//! Session metadata and the rules for resolving playback geometry.

use std::time::Duration;

use crate::error::{PlayerError, Result};
use crate::probe::ProbeInfo;
use crate::terminal::TerminalSize;

/// Frame dimensions in source pixels (one pixel renders as two characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

impl Resolution {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Immutable description of a playback session's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    pub width: usize,
    pub height: usize,
    pub frame_rate: f64,
    pub total_frames: Option<u64>,
    pub duration_secs: Option<f64>,
}

impl StreamMetadata {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Bytes in one luminance frame.
    pub fn frame_len(&self) -> usize {
        self.width * self.height
    }

    pub fn frame_interval(&self) -> Result<Duration> {
        frame_interval_for(self.frame_rate)
    }
}

/// Time between frames at `fps`. Rates that are not positive, or so small the
/// interval overflows a `Duration`, are a configuration error.
pub fn frame_interval_for(fps: f64) -> Result<Duration> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(PlayerError::configuration(format!("invalid frame rate {}", fps)));
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .map_err(|_| PlayerError::configuration(format!("frame rate {} is too low", fps)))
}

/// Caller-supplied values that win over anything probed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overrides {
    pub resolution: Option<Resolution>,
    pub fps: Option<f64>,
}

/// Scale `(src_w, src_h)` down to fit `(max_w, max_h)` keeping its aspect.
/// Sources already inside the box are left alone.
pub fn fit_within(src_w: usize, src_h: usize, max_w: usize, max_h: usize) -> (usize, usize) {
    if src_w == 0 || src_h == 0 {
        return (max_w.max(1), max_h.max(1));
    }
    if src_w <= max_w && src_h <= max_h {
        return (src_w, src_h);
    }
    if src_w * max_h >= src_h * max_w {
        (max_w, (src_h * max_w / src_w).max(1))
    } else {
        ((src_w * max_h / src_h).max(1), max_h)
    }
}

/// Resolve the session's metadata from probe results, overrides and the
/// terminal.
///
/// Resolution: explicit override, else the probed picture fitted into the
/// terminal, else the whole terminal area. Without an override or a terminal
/// there is nothing to size the output against and this is a configuration
/// error.
///
/// Frame rate: explicit override, else probed, else `fallback_fps`.
pub fn resolve(
    probe: &ProbeInfo,
    overrides: &Overrides,
    terminal: Option<TerminalSize>,
    fallback_fps: Option<f64>,
) -> Result<StreamMetadata> {
    let resolution = match (overrides.resolution, terminal) {
        (Some(r), _) => r,
        (None, Some(term)) => {
            let (max_w, max_h) = term.max_frame();
            let (w, h) = match (probe.width, probe.height) {
                (Some(w), Some(h)) => fit_within(w as usize, h as usize, max_w, max_h),
                _ => (max_w, max_h),
            };
            Resolution::new(w, h)
        }
        (None, None) => {
            return Err(PlayerError::configuration(
                "no resolution given and terminal size is unknown",
            ))
        }
    };
    if resolution.width == 0 || resolution.height == 0 {
        return Err(PlayerError::configuration(format!(
            "resolution {} has a zero dimension",
            resolution
        )));
    }

    if let Some(fps) = overrides.fps {
        frame_interval_for(fps)?;
    }
    let frame_rate = match (overrides.fps, probe.frame_rate, fallback_fps) {
        (Some(fps), _, _) => fps,
        (None, Some(fps), _) => fps,
        (None, None, Some(fps)) if fps.is_finite() && fps > 0.0 => {
            tracing::warn!(fps, "frame rate unknown, using fallback");
            fps
        }
        _ => {
            return Err(PlayerError::configuration(
                "frame rate could not be determined and no fallback is configured",
            ))
        }
    };
    frame_interval_for(frame_rate)?;

    // Counts use the source's own rate, not an fps override.
    let source_rate = probe.frame_rate.unwrap_or(frame_rate);
    let total_frames = probe.frame_count.or_else(|| {
        probe
            .duration_secs
            .map(|d| (d * source_rate).round() as u64)
            .filter(|&n| n > 0)
    });
    let duration_secs = probe
        .duration_secs
        .or_else(|| total_frames.map(|n| n as f64 / source_rate));

    Ok(StreamMetadata {
        width: resolution.width,
        height: resolution.height,
        frame_rate,
        total_frames,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hd_probe() -> ProbeInfo {
        ProbeInfo {
            width: Some(1920),
            height: Some(1080),
            frame_rate: Some(30.0),
            frame_count: None,
            duration_secs: Some(10.0),
        }
    }

    #[test]
    fn override_resolution_wins() {
        let overrides = Overrides {
            resolution: Some(Resolution::new(64, 32)),
            fps: None,
        };
        let meta = resolve(&hd_probe(), &overrides, Some(TerminalSize::new(200, 60)), None).unwrap();
        assert_eq!(meta.resolution(), Resolution::new(64, 32));
    }

    #[test]
    fn probed_picture_is_fitted_into_terminal() {
        let meta = resolve(&hd_probe(), &Overrides::default(), Some(TerminalSize::new(160, 50)), None).unwrap();
        // 80x46 box, 16:9 source is width-bound.
        assert_eq!((meta.width, meta.height), (80, 45));
    }

    #[test]
    fn unknown_picture_fills_terminal() {
        let meta = resolve(
            &ProbeInfo::default(),
            &Overrides::default(),
            Some(TerminalSize::new(100, 30)),
            Some(25.0),
        )
        .unwrap();
        assert_eq!((meta.width, meta.height), (50, 26));
    }

    #[test]
    fn no_resolution_and_no_terminal_is_fatal() {
        let err = resolve(&hd_probe(), &Overrides::default(), None, Some(25.0)).unwrap_err();
        assert!(matches!(err, PlayerError::Configuration(_)));
    }

    #[test]
    fn frame_rate_precedence() {
        let term = Some(TerminalSize::new(80, 24));
        let probed = resolve(&hd_probe(), &Overrides::default(), term, Some(25.0)).unwrap();
        assert_eq!(probed.frame_rate, 30.0);

        let forced = Overrides {
            resolution: None,
            fps: Some(12.0),
        };
        assert_eq!(resolve(&hd_probe(), &forced, term, None).unwrap().frame_rate, 12.0);

        let fallback = resolve(&ProbeInfo::default(), &Overrides::default(), term, Some(25.0)).unwrap();
        assert_eq!(fallback.frame_rate, 25.0);

        let err = resolve(&ProbeInfo::default(), &Overrides::default(), term, None).unwrap_err();
        assert!(matches!(err, PlayerError::Configuration(_)));
    }

    #[test]
    fn invalid_fps_override_is_rejected() {
        let overrides = Overrides {
            resolution: Some(Resolution::new(10, 10)),
            fps: Some(0.0),
        };
        assert!(resolve(&hd_probe(), &overrides, None, None).is_err());
    }

    #[test]
    fn total_frames_derived_from_duration() {
        let meta = resolve(&hd_probe(), &Overrides::default(), Some(TerminalSize::new(80, 24)), None).unwrap();
        assert_eq!(meta.total_frames, Some(300));
        assert_eq!(meta.duration_secs, Some(10.0));
    }

    #[test]
    fn duration_derived_from_frame_count() {
        let probe = ProbeInfo {
            frame_count: Some(50),
            duration_secs: None,
            ..hd_probe()
        };
        let meta = resolve(&probe, &Overrides::default(), Some(TerminalSize::new(80, 24)), None).unwrap();
        assert_eq!(meta.total_frames, Some(50));
        assert!((meta.duration_secs.unwrap() - 50.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn fit_never_upscales() {
        assert_eq!(fit_within(40, 20, 80, 40), (40, 20));
        assert_eq!(fit_within(400, 100, 80, 40), (80, 20));
        assert_eq!(fit_within(100, 400, 80, 40), (10, 40));
    }

    #[test]
    fn frame_interval_matches_rate() {
        let meta = StreamMetadata {
            width: 1,
            height: 1,
            frame_rate: 50.0,
            total_frames: None,
            duration_secs: None,
        };
        assert_eq!(meta.frame_interval().unwrap(), Duration::from_millis(20));
        assert_eq!(meta.frame_len(), 1);
    }

    #[test]
    fn vanishing_frame_rate_is_a_configuration_error() {
        assert!(matches!(
            frame_interval_for(1e-310),
            Err(PlayerError::Configuration(_))
        ));
        assert!(frame_interval_for(f64::NAN).is_err());

        let overrides = Overrides {
            resolution: Some(Resolution::new(10, 10)),
            fps: Some(1e-310),
        };
        let err = resolve(&hd_probe(), &overrides, None, None).unwrap_err();
        assert!(matches!(err, PlayerError::Configuration(_)));

        let tiny_probe = ProbeInfo {
            frame_rate: Some(1e-310),
            ..hd_probe()
        };
        let err = resolve(&tiny_probe, &Overrides::default(), Some(TerminalSize::new(80, 24)), None).unwrap_err();
        assert!(matches!(err, PlayerError::Configuration(_)));
    }
}
