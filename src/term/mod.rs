//! Redrawable terminal output.
//!
//! [`TermWriter`] buffers a full frame and, on [`TermWriter::flush`], erases
//! the previously drawn frame before writing the new one. With trimming the
//! frame is cut to the last whole lines that fit the terminal, so a redraw
//! never scrolls content it cannot erase later.

pub mod size;
pub mod tail;

use std::fmt;
use std::io::{self, Write};

use thiserror::Error;

pub use size::{CrosstermSize, TerminalSize};
pub use tail::{line_height, print_width, strip_ansi, tail_box_bound};

pub const ANSI_MOVE_CURSOR_START_LINE: &str = "\x1b[0G";
pub const ANSI_ERASE_TO_END: &str = "\x1b[0J";

pub fn move_cursor_up(lines: usize) -> String {
    format!("\x1b[{}A", lines)
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("TermWriter cannot flush without a valid width (current: {0})")]
    MissingWidth(usize),
    #[error("TermWriter cannot have size {width}x{height}")]
    InvalidSize { width: usize, height: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct TermWriter {
    out: Box<dyn Write + Send>,
    buf: Vec<u8>,
    /// Rows taken by the last flushed frame
    line_count: usize,
    width: usize,
    height: usize,
}

impl TermWriter {
    /// Writer to stdout without a size. Set one before flushing.
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            buf: Vec::new(),
            line_count: 0,
            width: 0,
            height: 0,
        }
    }

    pub fn with_size(mut self, width: usize, height: usize) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        self.width = width;
        self.height = height;
        Ok(self)
    }

    pub fn with_terminal_size(self, provider: &dyn TerminalSize) -> Result<Self, RenderError> {
        let (width, height) = size::size_or_fallback(provider);
        self.with_size(width as usize, height as usize)
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Rows taken by the last flushed frame
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Buffer bytes for the next frame. Nothing reaches the output until `flush`.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    pub fn write_line(&mut self, s: &str) {
        self.write_str(s);
        self.buf.push(b'\n');
    }

    /// Erase the previous frame and write the buffered one, keeping only the
    /// trailing lines that fit the terminal when `trim` is set.
    pub fn flush(&mut self, trim: bool) -> Result<(), RenderError> {
        if self.width == 0 {
            return Err(RenderError::MissingWidth(self.width));
        }
        if self.buf.is_empty() {
            return Ok(());
        }

        let max_lines = if trim { self.height } else { 0 };
        let buf = std::mem::take(&mut self.buf);
        let (frame, lines) = tail_box_bound(&buf, max_lines, self.width);

        self.clear_lines()?;
        self.line_count = lines;
        self.out.write_all(frame)?;
        self.out.flush()?;
        Ok(())
    }

    fn clear_lines(&mut self) -> io::Result<()> {
        if self.line_count == 0 {
            return Ok(());
        }
        let mut seq = String::new();
        if self.line_count > 1 {
            seq.push_str(&move_cursor_up(self.line_count - 1));
        }
        seq.push_str(ANSI_MOVE_CURSOR_START_LINE);
        seq.push_str(ANSI_ERASE_TO_END);
        self.out.write_all(seq.as_bytes())
    }
}

impl Default for TermWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for TermWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        TermWriter::write_str(self, s);
        Ok(())
    }
}
