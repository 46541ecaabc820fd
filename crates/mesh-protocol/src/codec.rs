//! Streaming line framer
//!
//! Collects bytes as they arrive and yields complete `\n`-terminated lines.
//! Used by observers that read whatever a link has buffered rather than
//! blocking on a whole line.

use tracing::warn;

/// Maximum line length (reasonable limit to prevent unbounded buffering)
const MAX_LINE_LEN: usize = 256;

/// Newline-delimited frame codec
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A line this long without a terminator is garbage; keep only the tail
        if self.buffer.len() > MAX_LINE_LEN && !self.buffer.contains(&b'\n') {
            warn!(
                "Discarding {} bytes without a line terminator",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    /// Extract the next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"LED,0,1\nLED,0,0\n");

        assert_eq!(codec.next_line().as_deref(), Some("LED,0,1"));
        assert_eq!(codec.next_line().as_deref(), Some("LED,0,0"));
        assert_eq!(codec.next_line(), None);
    }

    #[test]
    fn test_partial_line() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"MSG,hel");
        assert_eq!(codec.next_line(), None);
        assert_eq!(codec.pending(), 7);

        codec.push_bytes(b"lo,bob,alice\nRT");
        assert_eq!(codec.next_line().as_deref(), Some("MSG,hello,bob,alice"));
        assert_eq!(codec.next_line(), None);
        assert_eq!(codec.pending(), 2);
    }

    #[test]
    fn test_empty_line() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"\n");
        assert_eq!(codec.next_line().as_deref(), Some(""));
    }

    #[test]
    fn test_overlong_garbage_discarded() {
        let mut codec = LineCodec::new();
        codec.push_bytes(&[b'x'; MAX_LINE_LEN + 1]);
        assert_eq!(codec.pending(), 0);

        codec.push_bytes(b"PING\n");
        assert_eq!(codec.next_line().as_deref(), Some("PING"));
    }

    #[test]
    fn test_clear() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"CTS");
        codec.clear();
        codec.push_bytes(b"\n");
        assert_eq!(codec.next_line().as_deref(), Some(""));
    }
}
