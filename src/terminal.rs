//! Terminal facts, escape sequences and interrupt handling.
//!
//! Nothing in here is consulted implicitly: the terminal size is detected once
//! by the caller and handed to the player, so tests can inject any geometry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PlayerError, Result};

/// Move the cursor to the top-left cell.
pub const CURSOR_HOME: &str = "\x1b[H";
/// Clear the screen and move home.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
pub const HIDE_CURSOR: &str = "\x1b[?25l";
pub const SHOW_CURSOR: &str = "\x1b[?25h";

/// Rows under the frame used by the progress bar and the status line.
pub const RESERVED_ROWS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Size of the terminal attached to stdout, if any.
    pub fn detect() -> Option<Self> {
        terminal_size::terminal_size().map(|(w, h)| Self::new(w.0, h.0))
    }

    /// Largest frame, in source pixels, that fits without wrapping and
    /// leaves room for the progress bar and status line.
    pub fn max_frame(&self) -> (usize, usize) {
        let width = (self.cols as usize / 2).max(1);
        let height = (self.rows as usize).saturating_sub(RESERVED_ROWS).max(1);
        (width, height)
    }

    /// Whether `text` fits on one line without wrapping.
    pub fn fits(&self, text: &str) -> bool {
        text.chars().count() <= self.cols as usize
    }
}

/// Shared cancellation flag, set from a signal handler and polled between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this flag. Can only be installed once per process.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.cancel())
            .map_err(|e| PlayerError::configuration(format!("installing Ctrl-C handler: {}", e)))
    }
}
