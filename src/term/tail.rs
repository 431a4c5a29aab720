//! Display-width arithmetic for trimming output to the bottom of a viewport.

use regex::bytes::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x{1b}\x{9b}][\[\]()#;?]*(?:(?:(?:[a-zA-Z\d]*(?:;[a-zA-Z\d]*)*)?\x{07})|(?:(?:\d{1,4}(?:;\d{0,4})*)?[\dA-PRZcf-ntqry=><~]))",
    )
    .unwrap_or_else(|e| panic!("invalid ANSI escape pattern: {}", e))
});

/// Remove ANSI escape sequences
pub fn strip_ansi(bytes: &[u8]) -> Cow<'_, [u8]> {
    ANSI_ESCAPE.replace_all(bytes, &b""[..])
}

/// Number of characters a line occupies once escape sequences are removed
pub fn print_width(line: &[u8]) -> usize {
    String::from_utf8_lossy(&strip_ansi(line)).chars().count()
}

/// Rows a line of `width` characters wraps to in a viewport `max_width` wide
pub fn line_height(width: usize, max_width: usize) -> usize {
    if max_width == 0 {
        return 1;
    }
    1 + width.saturating_sub(1) / max_width
}

/// Trailing slice of `buf` made of whole lines that fit in `max_lines` rows of
/// `max_width` columns, and the number of rows it takes. A line that fits only
/// partially is dropped. `max_lines == 0` keeps everything.
pub fn tail_box_bound(buf: &[u8], max_lines: usize, max_width: usize) -> (&[u8], usize) {
    let mut lines = 0;
    let mut start = buf.len();
    // End of the next line to consider, exclusive of its newline
    let mut end = buf.len();

    for line in buf.rsplit(|b| *b == b'\n') {
        let height = line_height(print_width(line), max_width);
        if max_lines > 0 && lines + height > max_lines {
            break;
        }
        lines += height;
        start = end - line.len();
        end = start.saturating_sub(1);
    }

    (&buf[start..], lines)
}
