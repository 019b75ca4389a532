//! The one interface the core consumes from the outside world (§4.1):
//! a random-access character reader, targeting raw characters rather than
//! pre-lexed tokens since this engine has no separate lexer stage.

use crate::error::ParserError;

/// Random-access reader over a sequence of characters. Implementations must
/// make `set_position` backwards an O(1) operation — it is the only rewind
/// mechanism the packrat parser needs (§4.1).
pub trait TokenStream {
    /// The character at the current position. `Err` at end of stream.
    fn read(&self) -> Result<char, ParserError>;

    /// Advance one character. Returns whether the stream is now at EOF.
    fn next(&mut self) -> bool;

    fn position(&self) -> usize;

    /// Move to `position`, clamped to `[0, size]`.
    fn set_position(&mut self, position: usize);

    fn eof(&self) -> bool;

    fn size(&self) -> usize;

    /// The substring `[start, start + length)`, clamped to the stream bounds.
    fn get_segment(&self, start: usize, length: usize) -> String;
}

/// The crate's own [`TokenStream`] implementation: a random-access reader
/// over an in-memory `&str`, pre-split into `char`s so position arithmetic
/// stays in char offsets rather than UTF-8 byte offsets (the grammar IR's
/// `CharSet`/`Range`/`Char` all operate on code points, per §3.5).
#[derive(Debug, Clone)]
pub struct StrStream {
    chars: Vec<char>,
    position: usize,
}

impl StrStream {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            position: 0,
        }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }
}

impl TokenStream for StrStream {
    fn read(&self) -> Result<char, ParserError> {
        self.chars
            .get(self.position)
            .copied()
            .ok_or_else(|| ParserError::new(self.position, "read past end of stream"))
    }

    fn next(&mut self) -> bool {
        if self.position < self.chars.len() {
            self.position += 1;
        }
        self.eof()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position.min(self.chars.len());
    }

    fn eof(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn size(&self) -> usize {
        self.chars.len()
    }

    fn get_segment(&self, start: usize, length: usize) -> String {
        let start = start.min(self.chars.len());
        let end = start.saturating_add(length).min(self.chars.len());
        self.chars[start..end].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_advances() {
        let mut stream = StrStream::new("ab");
        assert_eq!(stream.read().unwrap(), 'a');
        assert!(!stream.next());
        assert_eq!(stream.read().unwrap(), 'b');
        assert!(stream.next());
        assert!(stream.eof());
        assert!(stream.read().is_err());
    }

    #[test]
    fn set_position_clamps_and_rewinds() {
        let mut stream = StrStream::new("abcd");
        stream.set_position(100);
        assert_eq!(stream.position(), 4);
        stream.set_position(1);
        assert_eq!(stream.read().unwrap(), 'b');
    }

    #[test]
    fn get_segment_clamps_past_end() {
        let stream = StrStream::new("abc");
        assert_eq!(stream.get_segment(1, 10), "bc");
        assert_eq!(stream.get_segment(10, 2), "");
    }
}
