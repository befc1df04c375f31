use serde::Serialize;
use std::fmt::Display;
use tracing::{debug, error, trace, warn};

use crate::accumulator::SentenceAccumulator;
use crate::boundary::{ContextWindow, classify};
use crate::sink::SentenceSink;

/// Sentence spoken in place of the reply when the model call fails.
pub const APOLOGY: &str =
    "Sorry, I ran into a problem while handling your request. Please try again later.";

/// One speakable sentence delivered to a [`SentenceSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceEvent {
    pub text: String,
    /// Set only on the first event of a turn.
    pub is_first: bool,
    /// Set on exactly one event per turn. Consumers release resources on it.
    pub is_last: bool,
}

/// Bookkeeping for one conversation turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub sentence_count: usize,
    pub final_sentence_sent: bool,
    pub tool_name: Option<String>,
}

/// Lifecycle of a [`StreamSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Accumulating,
    Closed,
}

/// Splits a stream of model tokens into sentences as they arrive.
///
/// One segmenter serves exactly one turn. Tokens must be fed in order from a
/// single producer; sentences are pushed to the sink inline, so a slow sink
/// slows token consumption.
///
/// ```
/// use murmur_rs::{RecordingSink, StreamSegmenter};
///
/// let sink = RecordingSink::new();
/// let mut seg = StreamSegmenter::new(sink.clone());
/// seg.on_token("你好！今天过得");
/// seg.on_token("怎么样？");
/// seg.on_complete(None);
/// assert_eq!(sink.texts(), vec!["你好！今天过得怎么样？", ""]);
/// ```
pub struct StreamSegmenter<S: SentenceSink> {
    sink: S,
    window: ContextWindow,
    sentence: SentenceAccumulator,
    full_response: String,
    state: SessionState,
    phase: SegmenterState,
}

impl<S: SentenceSink> StreamSegmenter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            window: ContextWindow::new(),
            sentence: SentenceAccumulator::new(),
            full_response: String::new(),
            state: SessionState::default(),
            phase: SegmenterState::Accumulating,
        }
    }

    /// Everything seen so far, unsegmented.
    pub fn full_response(&self) -> &str {
        &self.full_response
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SegmenterState {
        self.phase
    }

    /// Feed one model token.
    pub fn on_token(&mut self, token: &str) {
        if self.phase == SegmenterState::Closed {
            warn!(%token, "token after segmenter closed");
            return;
        }
        if token.is_empty() {
            return;
        }
        trace!(%token, "segmenter token");
        self.full_response.push_str(token);
        for ch in token.chars() {
            self.push_char(ch);
        }
    }

    /// The upstream stream finished. Emits the terminal event once.
    pub fn on_complete(&mut self, tool_name: Option<String>) {
        if tool_name.is_some() {
            self.state.tool_name = tool_name;
        }
        if !self.state.final_sentence_sent {
            self.state.final_sentence_sent = true;
            match self.sentence.finish() {
                Some(text) => self.emit(text, true),
                None => self.emit_terminal(String::new()),
            }
        }
        self.close();
        debug!(
            sentences = self.state.sentence_count,
            "segmentation complete"
        );
    }

    /// The upstream stream failed. Buffered text is discarded and the
    /// apology is spoken as the terminal event.
    pub fn on_error(&mut self, err: &dyn Display) {
        error!(error = %err, "model stream failed");
        if !self.state.final_sentence_sent {
            self.state.final_sentence_sent = true;
            self.sentence.clear();
            self.emit(APOLOGY.to_string(), true);
        }
        self.close();
    }

    fn close(&mut self) {
        self.phase = SegmenterState::Closed;
    }

    fn push_char(&mut self, ch: char) {
        self.window.push(ch);
        let class = classify(ch, &self.window);
        let decision = self.sentence.append(ch, &class);
        if let Some(text) = self.sentence.flush(decision) {
            self.emit(text, false);
        }
    }

    fn emit(&mut self, text: String, is_last: bool) {
        self.deliver(text, is_last);
        self.state.sentence_count += 1;
    }

    /// Terminal marker with no speech attached.
    fn emit_terminal(&mut self, text: String) {
        self.deliver(text, true);
    }

    fn deliver(&mut self, text: String, is_last: bool) {
        let event = SentenceEvent {
            text,
            is_first: self.state.sentence_count == 0,
            is_last,
        };
        debug!(text = %event.text, is_first = event.is_first, is_last, "sentence");
        self.sink.accept(event);
    }
}

impl<S: SentenceSink> Drop for StreamSegmenter<S> {
    fn drop(&mut self) {
        if self.phase == SegmenterState::Accumulating {
            self.on_error(&"turn dropped before completion");
        }
    }
}
