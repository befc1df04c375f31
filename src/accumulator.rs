use crate::boundary::{Boundary, Classification};
use crate::text_util::{contains_kaomoji, has_speech, is_substantial, speakable};

/// Shortest sentence, in characters, that may be emitted mid-stream.
pub const MIN_SENTENCE_LENGTH: usize = 5;

/// Kaomoji need at least this many characters in the buffer.
const KAOMOJI_MIN_CHARS: usize = 3;

/// Longest kaomoji the buffer is rescanned for after each character.
const KAOMOJI_SCAN_CHARS: usize = 16;

/// Whether the buffered sentence should be flushed after the latest character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Keep accumulating.
    Hold,
    /// A soft break was seen and the buffer is long enough.
    Allowed,
    /// A strong break was seen.
    Mandatory,
}

impl FlushDecision {
    pub fn should_flush(self) -> bool {
        !matches!(self, FlushDecision::Hold)
    }
}

/// Buffer for the sentence currently being built.
///
/// A flush only clears the buffer when the flushed text is substantial, so
/// short or punctuation-only prefixes carry over into the next sentence.
#[derive(Debug, Default)]
pub struct SentenceAccumulator {
    buffer: String,
    len: usize,
    kaomoji: bool,
}

impl SentenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// The last `n` characters of the buffer.
    fn tail(&self, n: usize) -> &str {
        match self.buffer.char_indices().rev().nth(n.saturating_sub(1)) {
            Some((at, _)) => &self.buffer[at..],
            None => &self.buffer,
        }
    }

    /// Append `ch` and decide whether the buffer should be flushed.
    pub fn append(&mut self, ch: char, class: &Classification) -> FlushDecision {
        self.buffer.push(ch);
        self.len += 1;
        if !self.kaomoji && self.len >= KAOMOJI_MIN_CHARS {
            self.kaomoji = contains_kaomoji(self.tail(KAOMOJI_SCAN_CHARS));
        }
        match class.boundary {
            Boundary::Strong => FlushDecision::Mandatory,
            Boundary::Soft if self.len >= MIN_SENTENCE_LENGTH => FlushDecision::Allowed,
            _ if self.kaomoji && self.len >= MIN_SENTENCE_LENGTH => FlushDecision::Allowed,
            _ => FlushDecision::Hold,
        }
    }

    /// Take the buffered sentence if `decision` permits it and the content is
    /// substantial.
    pub fn flush(&mut self, decision: FlushDecision) -> Option<String> {
        if !decision.should_flush() {
            return None;
        }
        let sentence = speakable(&self.buffer);
        if !is_substantial(&sentence, MIN_SENTENCE_LENGTH) {
            return None;
        }
        self.clear();
        Some(sentence)
    }

    /// Take whatever is left at the end of the stream.
    ///
    /// Unlike [`flush`](Self::flush) the length rule does not apply; the
    /// residue only needs to contain something besides punctuation. A short
    /// closing sentence such as `请确认。` that every mid-stream flush held
    /// back is still spoken here instead of being dropped.
    pub fn finish(&mut self) -> Option<String> {
        let sentence = speakable(&self.buffer);
        self.clear();
        if is_substantial(&sentence, MIN_SENTENCE_LENGTH) || has_speech(&sentence) {
            Some(sentence)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.len = 0;
        self.kaomoji = false;
    }
}
