use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// A completed model call, as reported to [`TraceHooks`].
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub input: String,
    pub output: String,
    pub tool_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Observability hooks around a turn.
///
/// Calls are best-effort: implementations must not block and must not fail
/// the turn. Exporters that talk to a remote service should queue or spawn.
pub trait TraceHooks: Send + Sync {
    /// Opens a span and returns its id, or `None` when tracing is off.
    fn start_span(&self, session_id: &Uuid, name: &str, input: &str) -> Option<String>;

    fn end_span(&self, session_id: &Uuid, span_id: &str, output: &str);

    fn record_generation(&self, session_id: &Uuid, generation: &Generation);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrace;

impl TraceHooks for NoopTrace {
    fn start_span(&self, _: &Uuid, _: &str, _: &str) -> Option<String> {
        None
    }

    fn end_span(&self, _: &Uuid, _: &str, _: &str) {}

    fn record_generation(&self, _: &Uuid, _: &Generation) {}
}

/// Writes spans and generations to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrace;

impl TraceHooks for LogTrace {
    fn start_span(&self, session_id: &Uuid, name: &str, input: &str) -> Option<String> {
        let span_id = Uuid::new_v4().to_string();
        debug!(%session_id, %span_id, span = name, input_chars = input.chars().count(), "span started");
        Some(span_id)
    }

    fn end_span(&self, session_id: &Uuid, span_id: &str, output: &str) {
        debug!(%session_id, %span_id, output_chars = output.chars().count(), "span ended");
    }

    fn record_generation(&self, session_id: &Uuid, generation: &Generation) {
        let elapsed_ms = (generation.ended_at - generation.started_at).num_milliseconds();
        debug!(
            %session_id,
            tool = generation.tool_name.as_deref().unwrap_or("-"),
            elapsed_ms,
            "generation: {}",
            generation.output
        );
    }
}
