//! Stream metadata probing through `ffprobe`.
//!
//! Probing never fails: whatever the prober cannot report (missing binary,
//! non-zero exit, unparseable JSON, absent keys) comes back as `None` and is
//! resolved later against overrides and the terminal size.

use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::Value;

/// What the prober could tell about the source. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub frame_count: Option<u64>,
    pub duration_secs: Option<f64>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<Value>,
    height: Option<Value>,
    r_frame_rate: Option<Value>,
    nb_frames: Option<Value>,
    duration: Option<Value>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<Value>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Parse an ffmpeg rate such as `30000/1001`, `25/1` or `29.97`.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite() && *x >= 0.0)
}

fn dimension(v: Option<&Value>) -> Option<u32> {
    number(v)
        .filter(|x| *x >= 1.0 && x.fract() == 0.0 && *x <= u32::MAX as f64)
        .map(|x| x as u32)
}

/// Interpret ffprobe's JSON output for the first video stream.
pub fn parse_probe_json(bytes: &[u8]) -> Result<ProbeInfo, serde_json::Error> {
    let out: ProbeOut = serde_json::from_slice(bytes)?;
    let mut info = ProbeInfo::default();

    if let Some(stream) = out.streams.first() {
        info.width = dimension(stream.width.as_ref());
        info.height = dimension(stream.height.as_ref());
        info.frame_rate = match stream.r_frame_rate.as_ref() {
            Some(Value::String(s)) => parse_frame_rate(s),
            other => number(other).filter(|r| *r > 0.0),
        };
        info.frame_count = number(stream.nb_frames.as_ref())
            .filter(|n| *n >= 1.0)
            .map(|n| n as u64);
        info.duration_secs = number(stream.duration.as_ref());
    }
    if info.duration_secs.is_none() {
        info.duration_secs = out
            .format
            .as_ref()
            .and_then(|f| number(f.duration.as_ref()));
    }
    Ok(info)
}

/// Ask `ffprobe` about the first video stream of `source`.
pub fn probe(ffprobe: &str, source: &str) -> ProbeInfo {
    let output = Command::new(ffprobe)
        .arg(source)
        .args([
            "-hide_banner",
            "-v",
            "quiet",
            "-select_streams",
            "v",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames,duration:format=duration",
            "-print_format",
            "json",
        ])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    let output = match output {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(program = ffprobe, error = %e, "could not run metadata prober");
            return ProbeInfo::default();
        }
    };
    if !output.status.success() {
        tracing::warn!(program = ffprobe, status = %output.status, source, "metadata prober failed");
        return ProbeInfo::default();
    }

    match parse_probe_json(&output.stdout) {
        Ok(info) => {
            tracing::debug!(?info, source, "probed stream");
            info
        }
        Err(e) => {
            tracing::warn!(error = %e, source, "unparseable prober output");
            ProbeInfo::default()
        }
    }
}
