//! UTF-8 safe streaming decoder for token-by-token model output.
//!
//! Token boundaries do not align with character boundaries: a token's
//! bytes may end in the middle of a multi-byte UTF-8 sequence. This
//! decoder buffers incomplete sequences and only emits complete, valid
//! UTF-8 text.

use super::tokenizer::Tokenizer;

/// A stateful decoder that assembles streamed token ids into text.
///
/// # Example
///
/// ```ignore
/// let mut decoder = StreamingDecoder::new(&tokenizer);
/// for id in generated_ids {
///     if let Some(text) = decoder.add_token(id) {
///         print!("{}", text);
///     }
/// }
/// print!("{}", decoder.flush());
/// ```
pub struct StreamingDecoder<'a> {
    tokenizer: &'a Tokenizer,
    buffer: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a new streaming decoder for the given tokenizer.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            buffer: Vec::with_capacity(16),
        }
    }

    /// Add a token and return any complete UTF-8 text.
    ///
    /// Returns `None` while the buffered bytes are still an incomplete
    /// sequence, or when the id is unknown.
    pub fn add_token(&mut self, id: u32) -> Option<String> {
        let bytes = if let Some(b) = self.tokenizer.vocab().bytes_of(id) {
            b
        } else if let Some(literal) = self.tokenizer.special_tokens().literal_of(id) {
            literal.as_bytes()
        } else {
            return None;
        };

        self.buffer.extend_from_slice(bytes);
        self.extract_complete_utf8()
    }

    /// Add multiple tokens at once and return complete UTF-8 text.
    ///
    /// Unknown ids are skipped; streamed output has no error channel.
    pub fn add_tokens(&mut self, ids: &[u32]) -> Option<String> {
        for &id in ids {
            let bytes = if let Some(b) = self.tokenizer.vocab().bytes_of(id) {
                b
            } else if let Some(literal) = self.tokenizer.special_tokens().literal_of(id) {
                literal.as_bytes()
            } else {
                continue;
            };
            self.buffer.extend_from_slice(bytes);
        }

        self.extract_complete_utf8()
    }

    /// Flush any remaining buffered bytes.
    ///
    /// Incomplete trailing sequences become the replacement character
    /// (U+FFFD).
    pub fn flush(&mut self) -> String {
        if self.buffer.is_empty() {
            return String::new();
        }

        let result = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        result
    }

    /// Reset the decoder state, discarding any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Whether bytes are buffered waiting for sequence completion.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Number of pending bytes in the buffer.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Drain the longest valid UTF-8 prefix of the buffer.
    fn extract_complete_utf8(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }

        let valid_len = self.find_valid_utf8_len();
        if valid_len == 0 {
            return None;
        }

        let valid_bytes: Vec<u8> = self.buffer.drain(..valid_len).collect();

        // SAFETY: the prefix was just validated as UTF-8.
        let result = unsafe { String::from_utf8_unchecked(valid_bytes) };
        Some(result)
    }

    /// Length of the longest valid UTF-8 prefix, accounting for an
    /// incomplete multi-byte sequence at the end.
    fn find_valid_utf8_len(&self) -> usize {
        let bytes = &self.buffer;
        let len = bytes.len();

        if len == 0 {
            return 0;
        }

        if std::str::from_utf8(bytes).is_ok() {
            return len;
        }

        // UTF-8 sequences are at most 4 bytes, so up to 3 trailing bytes
        // may belong to an unfinished sequence.
        for incomplete_len in 1..=3.min(len) {
            let check_len = len - incomplete_len;
            if check_len == 0 {
                continue;
            }

            if std::str::from_utf8(&bytes[..check_len]).is_ok()
                && could_be_incomplete_sequence(&bytes[check_len..])
            {
                return check_len;
            }
        }

        // Invalid bytes in the middle: emit up to the last valid point.
        for i in (0..len).rev() {
            if std::str::from_utf8(&bytes[..=i]).is_ok() {
                return i + 1;
            }
        }

        0
    }
}

/// Whether `bytes` could be the start of an unfinished UTF-8 sequence.
fn could_be_incomplete_sequence(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }

    match bytes[0] {
        0xC0..=0xDF => bytes.len() < 2, // 2-byte sequence
        0xE0..=0xEF => bytes.len() < 3, // 3-byte sequence
        0xF0..=0xF7 => bytes.len() < 4, // 4-byte sequence
        _ => false,
    }
}
