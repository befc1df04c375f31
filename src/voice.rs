use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use ollama_rs::generation::chat::ChatMessage;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::history::{Exchange, HistoryStore};
use crate::llm_client::{LLMClient, LlmError};
use crate::memory::MemoryOrchestrator;
use crate::segmenter::{APOLOGY, StreamSegmenter};
use crate::session::ChatSession;
use crate::sink::SentenceSink;
use crate::trace::{Generation, NoopTrace, TraceHooks};

/// Outcome of one streamed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnSummary {
    /// Spoken sentences, including the apology on failure.
    pub sentences: usize,
    /// Raw model text received before the turn ended.
    pub full_text: String,
    pub tool_name: Option<String>,
    pub failed: bool,
}

/// Conversational front end: builds prompts, talks to the model and hands
/// finished exchanges to the background collaborators.
pub struct Voice {
    llm: Arc<dyn LLMClient>,
    name: String,
    memory: MemoryOrchestrator,
    history: Option<Arc<dyn HistoryStore>>,
    trace: Arc<dyn TraceHooks>,
}

impl Voice {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            llm,
            name: "Voice".into(),
            memory: MemoryOrchestrator::disabled(),
            history: None,
            trace: Arc::new(NoopTrace),
        }
    }

    /// Sets the name used for logging.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn memory(mut self, memory: MemoryOrchestrator) -> Self {
        self.memory = memory;
        self
    }

    pub fn history(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn trace(mut self, hooks: Arc<dyn TraceHooks>) -> Self {
        self.trace = hooks;
        self
    }

    /// Messages for the next model call.
    ///
    /// Retrieved memory goes in as a system message at index 1: after the
    /// system prompt, or after the oldest history message when there is none.
    pub async fn build_prompt(&self, session: &ChatSession, message: &str) -> Vec<ChatMessage> {
        let memory = self
            .memory
            .build_memory_context(&session.user_id, message)
            .await;
        let convo = session.conversation().lock().await;
        let mut msgs = convo.prompt(message);
        if let Some(ctx) = memory {
            let at = msgs.len().min(1);
            msgs.insert(at, ChatMessage::system(ctx));
        }
        msgs
    }

    /// Single-shot turn. Never fails: problems are answered with [`APOLOGY`].
    pub async fn chat(&self, session: &ChatSession, message: &str) -> String {
        let user_at = session.begin_turn();
        info!(agent = %self.name, session_id = %session.session_id, "chat turn");
        let msgs = self.build_prompt(session, message).await;
        let span = self.trace.start_span(&session.session_id, "chat", message);
        match self.llm.chat(&msgs).await {
            Ok(text) => {
                debug!(agent = %self.name, %text, "chat reply");
                self.finish_turn(session, message, text.clone(), None, span, user_at)
                    .await;
                text
            }
            Err(e) => {
                error!(agent = %self.name, ?e, "chat failed");
                self.abort_turn(session, span);
                APOLOGY.to_string()
            }
        }
    }

    /// Streams the reply into `sink` one sentence at a time.
    ///
    /// Every event has been delivered by the time this returns. Exactly one
    /// event is marked last, whether the model finishes or fails.
    pub async fn chat_stream_by_sentence<S: SentenceSink>(
        &self,
        session: &ChatSession,
        message: &str,
        use_tools: bool,
        sink: S,
    ) -> TurnSummary {
        let user_at = session.begin_turn();
        info!(agent = %self.name, session_id = %session.session_id, use_tools, "streaming turn");
        let msgs = self.build_prompt(session, message).await;
        let span = self
            .trace
            .start_span(&session.session_id, "chat_stream", message);

        let mut segmenter = StreamSegmenter::new(sink);
        let mut tool_name: Option<String> = None;
        let outcome = async {
            let mut stream = self.llm.chat_stream(&msgs).await?;
            while let Some(tok) = stream.next().await {
                let tok = tok?;
                if use_tools && tool_name.is_none() {
                    if let Some(name) = tok.tool_name {
                        debug!(agent = %self.name, tool = %name, "tool call");
                        tool_name = Some(name);
                    }
                }
                segmenter.on_token(&tok.text);
            }
            Ok::<(), LlmError>(())
        }
        .await;

        let failed = match outcome {
            Ok(()) => {
                segmenter.on_complete(tool_name.clone());
                false
            }
            Err(e) => {
                segmenter.on_error(&e);
                true
            }
        };
        let summary = TurnSummary {
            sentences: segmenter.state().sentence_count,
            full_text: segmenter.full_response().to_string(),
            tool_name,
            failed,
        };
        drop(segmenter);

        if failed {
            self.abort_turn(session, span);
        } else {
            self.finish_turn(
                session,
                message,
                summary.full_text.clone(),
                summary.tool_name.clone(),
                span,
                user_at,
            )
            .await;
        }
        debug!(agent = %self.name, sentences = summary.sentences, failed, "turn finished");
        summary
    }

    /// Records the exchange in the conversation, then hands history, memory
    /// and trace bookkeeping to a background task.
    async fn finish_turn(
        &self,
        session: &ChatSession,
        user_message: &str,
        assistant_text: String,
        tool_name: Option<String>,
        span: Option<String>,
        user_at: DateTime<Utc>,
    ) {
        let assistant_at = Utc::now();
        if !assistant_text.trim().is_empty() {
            session
                .conversation()
                .lock()
                .await
                .push_exchange(user_message, assistant_text.as_str());
        }
        let exchange = Exchange {
            session_id: session.session_id,
            user_id: session.user_id.clone(),
            user_message: user_message.to_string(),
            assistant_text,
            tool_name,
            user_at,
            assistant_at,
        };
        let task = Completion {
            exchange,
            span,
            memory: self.memory.clone(),
            history: self.history.clone(),
            trace: self.trace.clone(),
        };
        tokio::spawn(task.run());
    }

    fn abort_turn(&self, session: &ChatSession, span: Option<String>) {
        if let Some(span) = span {
            self.trace.end_span(&session.session_id, &span, APOLOGY);
        }
    }
}

/// Post-turn work that must not delay the reply.
struct Completion {
    exchange: Exchange,
    span: Option<String>,
    memory: MemoryOrchestrator,
    history: Option<Arc<dyn HistoryStore>>,
    trace: Arc<dyn TraceHooks>,
}

impl Completion {
    async fn run(self) {
        let ex = &self.exchange;
        if !ex.assistant_text.trim().is_empty() {
            if let Some(history) = &self.history {
                if let Err(e) = history.persist_exchange(ex).await {
                    warn!(?e, session_id = %ex.session_id, "history persist failed");
                }
            }
            self.memory
                .persist(&ex.user_id, &ex.user_message, &ex.assistant_text)
                .await;
        }
        if let Some(span) = &self.span {
            self.trace
                .end_span(&ex.session_id, span, &ex.assistant_text);
        }
        self.trace.record_generation(
            &ex.session_id,
            &Generation {
                input: ex.user_message.clone(),
                output: ex.assistant_text.clone(),
                tool_name: ex.tool_name.clone(),
                started_at: ex.user_at,
                ended_at: ex.assistant_at,
            },
        );
        debug!(session_id = %ex.session_id, "turn persisted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::history::InMemoryHistory;
    use crate::memory::MemoryRetriever;
    use crate::sink::RecordingSink;
    use crate::test_helpers::ScriptedLLM;
    use async_trait::async_trait;
    use ollama_rs::generation::chat::MessageRole;
    use std::time::Duration;

    struct FixedMemory(&'static str);

    #[async_trait]
    impl MemoryRetriever for FixedMemory {
        async fn retrieve_context(&self, _: &str, _: &str) -> anyhow::Result<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn session(system: Option<&str>) -> ChatSession {
        ChatSession::new("u1", Conversation::new(system.map(str::to_string), 10))
    }

    async fn wait_for(history: &InMemoryHistory, n: usize) {
        for _ in 0..100 {
            if history.exchanges().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("history never reached {n} exchanges");
    }

    #[tokio::test]
    async fn memory_context_follows_system_prompt() {
        let llm = ScriptedLLM::new(["ok"]);
        let voice = Voice::new(Arc::new(llm.clone())).memory(
            MemoryOrchestrator::new(true).with_retriever(Arc::new(FixedMemory("User Memories:\n- cats\n"))),
        );
        let s = session(Some("be kind"));
        voice.chat(&s, "hello").await;

        let prompt = &llm.prompts()[0];
        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt[0].content, "be kind");
        assert!(matches!(prompt[1].role, MessageRole::System));
        assert!(prompt[1].content.contains("cats"));
        assert_eq!(prompt[2].content, "hello");
    }

    #[tokio::test]
    async fn memory_context_sits_second_without_system_prompt() {
        let llm = ScriptedLLM::new(["ok"]);
        let voice = Voice::new(Arc::new(llm.clone()))
            .memory(MemoryOrchestrator::new(true).with_retriever(Arc::new(FixedMemory("ctx"))));
        let s = session(None);
        s.conversation()
            .lock()
            .await
            .push_exchange("earlier q", "earlier a");
        voice.chat(&s, "now").await;
        let prompt: Vec<_> = llm.prompts()[0]
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(prompt, vec!["earlier q", "ctx", "earlier a", "now"]);
    }

    #[tokio::test]
    async fn memory_context_follows_lone_message() {
        let llm = ScriptedLLM::new(["ok"]);
        let voice = Voice::new(Arc::new(llm.clone()))
            .memory(MemoryOrchestrator::new(true).with_retriever(Arc::new(FixedMemory("ctx"))));
        voice.chat(&session(None), "hello").await;
        let prompt = &llm.prompts()[0];
        assert_eq!(prompt[0].content, "hello");
        assert_eq!(prompt[1].content, "ctx");
    }

    #[tokio::test]
    async fn sync_chat_apologises_on_failure() {
        let voice = Voice::new(Arc::new(ScriptedLLM::unreachable("refused")));
        assert_eq!(voice.chat(&session(None), "hi").await, APOLOGY);
        let voice = Voice::new(Arc::new(ScriptedLLM::new(Vec::<&str>::new())));
        assert_eq!(voice.chat(&session(None), "hi").await, APOLOGY);
    }

    #[tokio::test]
    async fn streamed_turn_is_recorded() {
        let history = Arc::new(InMemoryHistory::new());
        let llm = ScriptedLLM::new(["今天天气", "很好。", "我们出去走走吧！"]);
        let voice = Voice::new(Arc::new(llm.clone())).history(history.clone());
        let s = session(None);
        let sink = RecordingSink::new();

        let summary = voice.chat_stream_by_sentence(&s, "天气如何", false, sink.clone()).await;
        assert_eq!(sink.texts(), vec!["今天天气很好。", "我们出去走走吧！", ""]);
        assert_eq!(summary.sentences, 2);
        assert!(!summary.failed);

        wait_for(&history, 1).await;
        let ex = &history.exchanges()[0];
        assert_eq!(ex.assistant_text, "今天天气很好。我们出去走走吧！");
        assert_eq!(ex.user_message, "天气如何");

        voice.chat_stream_by_sentence(&s, "好", false, RecordingSink::new()).await;
        let second = &llm.prompts()[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].content, "今天天气很好。我们出去走走吧！");
    }

    #[tokio::test]
    async fn tool_name_only_tracked_when_enabled() {
        let llm = ScriptedLLM::new(["查询", "完成了。"]).with_tool_at(1, "weather");
        let voice = Voice::new(Arc::new(llm));
        let on = voice
            .chat_stream_by_sentence(&session(None), "q", true, RecordingSink::new())
            .await;
        assert_eq!(on.tool_name.as_deref(), Some("weather"));
        let off = voice
            .chat_stream_by_sentence(&session(None), "q", false, RecordingSink::new())
            .await;
        assert_eq!(off.tool_name, None);
    }

    #[tokio::test]
    async fn stream_failure_speaks_apology_once() {
        let history = Arc::new(InMemoryHistory::new());
        let llm = ScriptedLLM::new(["第一句话说完了。", "第二句"]).then_fail("reset");
        let voice = Voice::new(Arc::new(llm)).history(history.clone());
        let sink = RecordingSink::new();

        let summary = voice
            .chat_stream_by_sentence(&session(None), "q", false, sink.clone())
            .await;
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].text, APOLOGY);
        assert!(!events[1].is_first);
        assert!(events[1].is_last);
        assert!(summary.failed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(history.exchanges().is_empty());
    }

    #[tokio::test]
    async fn open_failure_is_a_single_event() {
        let voice = Voice::new(Arc::new(ScriptedLLM::unreachable("down")));
        let sink = RecordingSink::new();
        voice
            .chat_stream_by_sentence(&session(None), "q", false, sink.clone())
            .await;
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_first && events[0].is_last);
        assert_eq!(events[0].text, APOLOGY);
    }
}
