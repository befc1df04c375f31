use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

use crate::segmenter::SentenceEvent;

/// Destination for sentences produced by a
/// [`StreamSegmenter`](crate::StreamSegmenter).
///
/// Sinks are called inline while tokens are processed, so they should only do
/// bounded work such as queueing the sentence for a TTS engine.
///
/// Any `FnMut(&str, bool, bool)` closure taking `(text, is_first, is_last)`
/// is a sink:
///
/// ```
/// use murmur_rs::StreamSegmenter;
///
/// let mut spoken = Vec::new();
/// {
///     let sink = |text: &str, _first: bool, last: bool| spoken.push((text.to_string(), last));
///     let mut seg = StreamSegmenter::new(sink);
///     seg.on_token("你好，今天过得怎么样？");
///     seg.on_complete(None);
/// }
/// assert_eq!(spoken.last(), Some(&(String::new(), true)));
/// ```
pub trait SentenceSink: Send {
    /// Receive the next sentence of the turn.
    fn accept(&mut self, event: SentenceEvent);
}

impl<F> SentenceSink for F
where
    F: FnMut(&str, bool, bool) + Send,
{
    fn accept(&mut self, event: SentenceEvent) {
        self(&event.text, event.is_first, event.is_last)
    }
}

/// [`SentenceSink`] forwarding events to a consuming task over a channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<SentenceEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<SentenceEvent>) -> Self {
        Self { tx }
    }
}

impl SentenceSink for ChannelSink {
    fn accept(&mut self, event: SentenceEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("sentence receiver dropped");
        }
    }
}

/// [`SentenceSink`] that logs sentences using [`tracing`].
pub struct TracingSink;

impl SentenceSink for TracingSink {
    fn accept(&mut self, event: SentenceEvent) {
        tracing::info!(is_first = event.is_first, is_last = event.is_last, "say: {}", event.text);
    }
}

/// [`SentenceSink`] that stores events for later inspection.
/// This is primarily useful for tests where no speech is produced.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<SentenceEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far.
    pub fn events(&self) -> Vec<SentenceEvent> {
        self.log.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Text of every event received so far.
    pub fn texts(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.text).collect()
    }
}

impl SentenceSink for RecordingSink {
    fn accept(&mut self, event: SentenceEvent) {
        if let Ok(mut log) = self.log.lock() {
            log.push(event);
        }
    }
}
