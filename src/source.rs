//! Frame sources: the pull side of the playback pipeline.
//!
//! A source is opened once, reports its [`StreamMetadata`], hands out frames
//! one at a time and is closed exactly once. Consuming frames advances the
//! underlying stream irreversibly; there is no rewind.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::aiv::FileFrameSource;
use crate::error::{PlayerError, Result};
use crate::frame::Frame;
use crate::metadata::{self, Overrides, Resolution, StreamMetadata};
use crate::probe;
use crate::terminal::{CancelFlag, TerminalSize};
use crate::AppConfig;

/// How often a blocked pull re-checks the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of asking a source for its next frame.
#[derive(Debug)]
pub enum Pull {
    Frame(Frame),
    /// The stream ended: clean end, short read, or the decoder went away.
    EndOfStream,
    /// No data arrived within the stall timeout.
    Stalled,
    Cancelled,
}

pub trait FrameSource {
    /// Human-readable origin, e.g. the input path or URL.
    fn id(&self) -> &str;

    fn metadata(&self) -> &StreamMetadata;

    /// Block until the next frame, the end of the stream, a stall or a
    /// cancellation, whichever comes first.
    fn next_frame(&mut self, cancel: &CancelFlag) -> Result<Pull>;

    /// Release the underlying resources. Idempotent.
    fn close(&mut self);

    /// Lazy iterator over the remaining frames, stopping at the first
    /// non-frame pull.
    fn frames<'a>(&'a mut self, cancel: &'a CancelFlag) -> Frames<'a, Self>
    where
        Self: Sized,
    {
        Frames {
            source: self,
            cancel,
            finished: false,
        }
    }
}

pub struct Frames<'a, S> {
    source: &'a mut S,
    cancel: &'a CancelFlag,
    finished: bool,
}

impl<S: FrameSource> Iterator for Frames<'_, S> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.source.next_frame(self.cancel) {
            Ok(Pull::Frame(frame)) => Some(Ok(frame)),
            Ok(_) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` from `reader`, returning how many bytes arrived before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads fixed-size buffers from a byte stream on a worker thread.
///
/// Hand-off is a rendezvous: the worker reads one buffer and then blocks until
/// the consumer takes it, so at most one frame is in flight. Pulls wait in
/// short slices so a cancellation is seen even while the stream produces
/// nothing.
pub struct FrameReader {
    rx: Option<Receiver<Vec<u8>>>,
    worker: Option<JoinHandle<()>>,
}

impl FrameReader {
    pub fn spawn<R: Read + Send + 'static>(mut reader: R, frame_len: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(0);
        let worker = thread::Builder::new()
            .name("asciiplay-frame-reader".to_owned())
            .spawn(move || loop {
                let mut buf = vec![0u8; frame_len];
                match read_full(&mut reader, &mut buf) {
                    Ok(n) if n == frame_len && frame_len > 0 => {
                        if tx.send(buf).is_err() {
                            break;
                        }
                    }
                    Ok(n) => {
                        if n > 0 {
                            tracing::debug!(bytes = n, frame_len, "dropping partial trailing frame");
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "decoder stream read failed");
                        break;
                    }
                }
            })?;
        Ok(Self {
            rx: Some(rx),
            worker: Some(worker),
        })
    }

    /// Next raw buffer, or why there is none.
    pub fn pull(&mut self, cancel: &CancelFlag, stall_timeout: Option<Duration>) -> PullRaw {
        let Some(rx) = self.rx.as_ref() else {
            return PullRaw::End;
        };
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return PullRaw::Cancelled;
            }
            let mut wait = POLL_INTERVAL;
            if let Some(limit) = stall_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    return PullRaw::Stalled;
                }
                wait = wait.min(limit - waited);
            }
            match rx.recv_timeout(wait) {
                Ok(buf) => return PullRaw::Buffer(buf),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return PullRaw::End,
            }
        }
    }

    /// Stop accepting buffers. A worker blocked on sending gives up.
    pub fn stop(&mut self) {
        self.rx.take();
    }

    /// Wait for the worker. Only call once its input is known to be closed.
    pub fn join(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("frame reader thread panicked");
            }
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PullRaw {
    Buffer(Vec<u8>),
    End,
    Stalled,
    Cancelled,
}

/// Owns the decoder child process and kills it when dropped.
pub struct DecoderProcess {
    program: String,
    child: Option<Child>,
}

impl DecoderProcess {
    /// Spawn `cmd` with stdout piped and the other streams detached.
    pub fn spawn(mut cmd: Command) -> Result<Self> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let child = cmd.spawn().map_err(|e| PlayerError::DecoderSpawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(program = %program, pid = child.id(), "decoder started");
        Ok(Self {
            program,
            child: Some(child),
        })
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.as_mut().and_then(|c| c.stdout.take())
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kill the process if it is still alive and reap it. Later calls are no-ops.
    pub fn terminate(&mut self) -> Option<ExitStatus> {
        let mut child = self.child.take()?;
        let status = match child.try_wait() {
            Ok(Some(status)) => Ok(status),
            _ => {
                let _ = child.kill();
                child.wait()
            }
        };
        match status {
            Ok(status) => {
                tracing::debug!(program = %self.program, %status, "decoder stopped");
                Some(status)
            }
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "failed to reap decoder");
                None
            }
        }
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Frames decoded live by an external `ffmpeg` process.
pub struct LiveFrameSource {
    id: String,
    metadata: StreamMetadata,
    decoder: DecoderProcess,
    reader: FrameReader,
    stall_timeout: Option<Duration>,
}

impl LiveFrameSource {
    /// Probe `input`, resolve the playback geometry and start the decoder.
    pub fn open(
        input: &str,
        overrides: &Overrides,
        terminal: Option<TerminalSize>,
        config: &AppConfig,
    ) -> Result<Self> {
        let stall_timeout = config.stall_timeout()?;
        let info = probe::probe(&config.ffprobe, input);
        let metadata = metadata::resolve(&info, overrides, terminal, config.fallback_fps)?;
        let cmd = decoder_command(&config.ffmpeg, input, metadata.resolution());
        let decoder = DecoderProcess::spawn(cmd)?;
        Self::from_decoder(input, metadata, decoder, stall_timeout)
    }

    /// Wrap an already running decoder whose stdout carries raw frames at
    /// `metadata`'s resolution.
    pub fn from_decoder(
        id: &str,
        metadata: StreamMetadata,
        mut decoder: DecoderProcess,
        stall_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stdout = decoder.take_stdout().ok_or_else(|| PlayerError::DecoderSpawn {
            program: decoder.program.clone(),
            reason: "stdout is not piped".to_owned(),
        })?;
        let reader = FrameReader::spawn(stdout, metadata.frame_len())?;
        Ok(Self {
            id: id.to_owned(),
            metadata,
            decoder,
            reader,
            stall_timeout,
        })
    }

    pub fn is_decoder_running(&mut self) -> bool {
        self.decoder.is_running()
    }
}

impl FrameSource for LiveFrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next_frame(&mut self, cancel: &CancelFlag) -> Result<Pull> {
        Ok(match self.reader.pull(cancel, self.stall_timeout) {
            PullRaw::Buffer(buf) => Pull::Frame(Frame::new(self.metadata.width, self.metadata.height, buf)?),
            PullRaw::End => Pull::EndOfStream,
            PullRaw::Stalled => {
                tracing::warn!(source = %self.id, timeout = ?self.stall_timeout, "decoder stalled");
                Pull::Stalled
            }
            PullRaw::Cancelled => Pull::Cancelled,
        })
    }

    fn close(&mut self) {
        self.reader.stop();
        if let Some(status) = self.decoder.terminate() {
            // Killed decoders close their stdout, so the reader is about to exit.
            self.reader.join();
            if !status.success() {
                tracing::debug!(source = %self.id, %status, "decoder exited with failure status");
            }
        }
    }
}

impl Drop for LiveFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// `ffmpeg` invocation emitting raw 8-bit gray frames scaled to `res` on stdout.
pub fn decoder_command(ffmpeg: &str, input: &str, res: Resolution) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error", "-i", input])
        .args(["-f", "image2pipe", "-pix_fmt", "gray"])
        .arg("-vf")
        .arg(format!("scale={}:{}", res.width, res.height))
        .args(["-vcodec", "rawvideo", "-"]);
    cmd
}

/// Inputs that look like `scheme://...` are handed to the decoder unchecked.
pub fn is_url(input: &str) -> bool {
    match input.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && !rest.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}

/// Fail fast on inputs that are neither an existing file nor a URL.
pub fn check_input(input: &str) -> Result<()> {
    if is_url(input) || Path::new(input).is_file() {
        Ok(())
    } else {
        Err(PlayerError::source_unavailable(input, "not an existing file or a URL"))
    }
}

/// The concrete source picked for an input at open time.
pub enum MediaSource {
    Live(LiveFrameSource),
    File(FileFrameSource),
}

impl MediaSource {
    /// `.aiv` files are read directly, everything else goes through the decoder.
    pub fn open(
        input: &str,
        overrides: &Overrides,
        terminal: Option<TerminalSize>,
        config: &AppConfig,
    ) -> Result<Self> {
        check_input(input)?;
        let is_aiv = !is_url(input)
            && Path::new(input)
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("aiv"));
        if is_aiv {
            Ok(Self::File(FileFrameSource::open(Path::new(input), overrides)?))
        } else {
            Ok(Self::Live(LiveFrameSource::open(input, overrides, terminal, config)?))
        }
    }
}

impl FrameSource for MediaSource {
    fn id(&self) -> &str {
        match self {
            Self::Live(s) => s.id(),
            Self::File(s) => s.id(),
        }
    }

    fn metadata(&self) -> &StreamMetadata {
        match self {
            Self::Live(s) => s.metadata(),
            Self::File(s) => s.metadata(),
        }
    }

    fn next_frame(&mut self, cancel: &CancelFlag) -> Result<Pull> {
        match self {
            Self::Live(s) => s.next_frame(cancel),
            Self::File(s) => s.next_frame(cancel),
        }
    }

    fn close(&mut self) {
        match self {
            Self::Live(s) => s.close(),
            Self::File(s) => s.close(),
        }
    }
}
