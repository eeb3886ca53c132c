//! Byte cursor for the document parser
//!
//! Searches for delimiters go through `memchr`, which picks SSE2/AVX2/NEON
//! at runtime. Positions are byte offsets into the whole input so the parser
//! can slice the original `&str` and compute line/column on failure.

use memchr::{memchr, memmem};

pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Scanner { input, pos: 0 }
    }

    #[inline]
    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute offset, clamped to the end of input.
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.rest().is_empty()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.rest().get(offset).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.set_position(self.pos.saturating_add(n));
    }

    /// Skip XML whitespace: space, tab, CR, LF.
    pub fn skip_whitespace(&mut self) {
        let skipped = self
            .rest()
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
            .count();
        self.pos += skipped;
    }

    #[inline]
    pub fn find_tag_start(&self) -> Option<usize> {
        self.find_byte(b'<')
    }

    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, self.rest()).map(|i| self.pos + i)
    }

    /// Absolute offset of the next `needle`
    #[inline]
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(self.rest(), needle).map(|i| self.pos + i)
    }

    /// Offset of the `>` ending `<!DOCTYPE ...>` style markup. A `>` inside
    /// `[...]` does not count.
    pub fn find_markup_end(&self) -> Option<usize> {
        let mut depth = 0usize;
        self.rest()
            .iter()
            .position(|&b| {
                match b {
                    b'[' => depth += 1,
                    b']' => depth = depth.saturating_sub(1),
                    b'>' => return depth == 0,
                    _ => {}
                }
                false
            })
            .map(|i| self.pos + i)
    }

    #[inline]
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.rest().starts_with(needle)
    }

    /// Consume a name and return its bytes, or `None` (without moving) if
    /// no name starts here.
    pub fn read_name(&mut self) -> Option<&'a [u8]> {
        let rest = self.rest();
        if !is_name_start_char(*rest.first()?) {
            return None;
        }
        let len = 1 + rest[1..].iter().take_while(|&&b| is_name_char(b)).count();
        self.pos += len;
        Some(&rest[..len])
    }
}

/// Letters, `_`, `:` and any byte of a multi-byte UTF-8 sequence.
#[inline]
pub fn is_name_start_char(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'_' | b':') || !b.is_ascii()
}

#[inline]
fn is_name_char(b: u8) -> bool {
    is_name_start_char(b) || b.is_ascii_digit() || matches!(b, b'-' | b'.')
}
