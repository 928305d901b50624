//! Accumulated text buffer with terminal decoding and tail search.
//!
//! Raw bytes from the device are run through a `vte` parser so that ANSI/VT
//! escape sequences, carriage returns and backspaces never reach the prompt
//! patterns. Invalid UTF-8 is decoded lossily instead of raising an error.
//!
//! Like scrapli, only the last `search_depth` bytes of the buffer are searched
//! for prompts; long outputs such as `admin save index detail` would otherwise
//! make every read quadratic.

use std::fmt;

use memchr::memrchr;
use regex::{Match, Regex};
use vte::{Parser, Perform};

/// Append-only text accumulator for one session.
pub struct PatternBuffer {
    /// Decoded text received so far.
    text: String,

    /// Terminal parser; keeps state across chunks so split escape
    /// sequences are still recognised.
    parser: Parser,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

/// `vte` performer that keeps printable characters, newlines and tabs.
struct TextSink<'a>(&'a mut String);

impl Perform for TextSink<'_> {
    fn print(&mut self, c: char) {
        self.0.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\t' => self.0.push(byte as char),
            // \r, \x08 and the remaining C0 controls are dropped
            _ => {}
        }
    }
}

impl PatternBuffer {
    /// Create a new buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            text: String::with_capacity(4096),
            parser: Parser::new(),
            search_depth,
        }
    }

    /// Decode raw bytes and append them.
    pub fn extend(&mut self, data: &[u8]) {
        let mut sink = TextSink(&mut self.text);
        self.parser.advance(&mut sink, data);
    }

    /// The last `search_depth` bytes of decoded text.
    pub fn tail(&self) -> &str {
        let mut start = self.text.len().saturating_sub(self.search_depth);
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        &self.text[start..]
    }

    /// Search only the tail of the buffer for the pattern.
    pub fn search_tail(&self, pattern: &Regex) -> Option<Match<'_>> {
        pattern.find(self.tail())
    }

    /// Check if the tail contains a pattern match.
    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        self.search_tail(pattern).is_some()
    }

    /// The last line that has visible content, without its line terminator.
    ///
    /// Returns an empty string for an empty (or whitespace-only) buffer.
    pub fn last_line(&self) -> &str {
        last_non_empty_line(&self.text)
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// Get the buffer contents.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Get the current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Get the search depth setting.
    pub fn search_depth(&self) -> usize {
        self.search_depth
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("len", &self.text.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

/// Last line of `text` with visible content.
pub(crate) fn last_non_empty_line(text: &str) -> &str {
    last_line_span(text).1
}

/// Byte offset and contents of the last line of `text` with visible content.
pub(crate) fn last_line_span(text: &str) -> (usize, &str) {
    let trimmed = text.trim_end();
    match memrchr(b'\n', trimmed.as_bytes()) {
        Some(pos) => (pos + 1, &trimmed[pos + 1..]),
        None => (0, trimmed),
    }
}
