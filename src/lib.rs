//! Streaming sentence segmentation for spoken chat replies.
//!
//! Model tokens go into a [`StreamSegmenter`], which hands complete
//! sentences to a [`SentenceSink`] as soon as they can be spoken. [`Voice`]
//! wraps the segmenter with prompt assembly, memory lookups and post-turn
//! persistence.

pub mod accumulator;
pub mod boundary;
pub mod config;
pub mod conversation;
pub mod history;
mod llm_client;
pub mod memory;
mod ollama_llm;
mod retry;
pub mod segmenter;
pub mod session;
pub mod sink;
#[cfg(test)]
pub mod test_helpers;
pub mod text_util;
pub mod trace;
mod voice;

pub use crate::llm_client::{LLMClient, LlmError, Token, TokenStream};
pub use crate::ollama_llm::OllamaLLM;
pub use accumulator::{FlushDecision, SentenceAccumulator};
pub use boundary::{Boundary, Classification, ContextWindow, classify};
pub use config::{AppConfig, ConversationConfig, LlmConfig, LogLevel, MemoryConfig};
pub use conversation::Conversation;
pub use history::{Exchange, HistoryStore, InMemoryHistory, JsonlHistory};
pub use memory::{Mem0Client, MemoryOrchestrator, MemoryRetriever, MemoryWriter, MemosClient};
pub use retry::{RetryLLM, RetryPolicy};
pub use segmenter::{APOLOGY, SegmenterState, SentenceEvent, SessionState, StreamSegmenter};
pub use session::ChatSession;
pub use sink::{ChannelSink, RecordingSink, SentenceSink, TracingSink};
pub use trace::{Generation, LogTrace, NoopTrace, TraceHooks};
pub use voice::{TurnSummary, Voice};
