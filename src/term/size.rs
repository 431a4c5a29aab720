use std::io;

/// Used when the terminal size cannot be queried (e.g. output is piped)
pub const FALLBACK_SIZE: (u16, u16) = (80, 25);

/// Source of the terminal's `(width, height)` in cells
pub trait TerminalSize {
    fn size(&self) -> io::Result<(u16, u16)>;
}

/// Queries the controlling terminal through crossterm
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosstermSize;

impl TerminalSize for CrosstermSize {
    fn size(&self) -> io::Result<(u16, u16)> {
        crossterm::terminal::size()
    }
}

/// Size reported by `provider`, or [`FALLBACK_SIZE`] when it fails or reports zero
pub fn size_or_fallback(provider: &dyn TerminalSize) -> (u16, u16) {
    match provider.size() {
        Ok((width, height)) if width > 0 && height > 0 => (width, height),
        Ok(_) => FALLBACK_SIZE,
        Err(e) => {
            tracing::debug!(error = %e, "could not query terminal size, using fallback");
            FALLBACK_SIZE
        }
    }
}
