use async_trait::async_trait;
use futures::stream;
use httpmock::prelude::*;
use murmur_rs::{
    APOLOGY, ChannelSink, ChatSession, Conversation, InMemoryHistory, LLMClient, LlmError,
    MemoryConfig, MemoryOrchestrator, SentenceEvent, Token, TokenStream, Voice,
};
use ollama_rs::generation::chat::ChatMessage;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

/// Streams a fixed reply and remembers the prompts it saw.
#[derive(Clone, Default)]
struct EchoLLM {
    reply: Vec<&'static str>,
    fail: bool,
    seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

#[async_trait]
impl LLMClient for EchoLLM {
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let mut items: Vec<Result<Token, LlmError>> =
            self.reply.iter().map(|t| Ok(Token::new(*t))).collect();
        if self.fail {
            items.push(Err(LlmError::Stream("socket closed".into())));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

fn session() -> ChatSession {
    ChatSession::new("u42", Conversation::new(Some("你是一个语音助手".into()), 20))
}

#[tokio::test]
async fn streamed_sentences_reach_consumer_task() {
    // Given a consumer draining sentences from a channel
    let (tx, mut rx) = unbounded_channel::<SentenceEvent>();
    let consumer = tokio::spawn(async move {
        let mut heard = Vec::new();
        while let Some(ev) = rx.recv().await {
            let last = ev.is_last;
            heard.push(ev);
            if last {
                break;
            }
        }
        heard
    });
    let llm = EchoLLM {
        reply: vec!["好的，我来", "帮你查一下。", "明天会下雨。"],
        ..EchoLLM::default()
    };
    let voice = Voice::new(Arc::new(llm));

    // When a turn is streamed
    let summary = voice
        .chat_stream_by_sentence(&session(), "明天天气怎么样", false, ChannelSink::new(tx))
        .await;

    // Then the consumer hears every sentence in order
    let heard = consumer.await.unwrap();
    let texts: Vec<_> = heard.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["好的，我来帮你查一下。", "明天会下雨。", ""]);
    assert!(heard[0].is_first);
    assert_eq!(summary.sentences, 2);
    assert_eq!(summary.full_text, "好的，我来帮你查一下。明天会下雨。");
}

#[tokio::test]
async fn memory_services_wrap_the_turn() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/product/search");
            then.status(200)
                .json_body(json!({"data": {"text_mem": ["喜欢下雨天"]}}));
        })
        .await;
    let add = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/memories").json_body(json!({
                "user_id": "u42",
                "text": "User: 你好\nAssistant: 你好，很高兴见到你！",
                "app": "murmur"
            }));
            then.status(200);
        })
        .await;

    let cfg = MemoryConfig {
        memos_enabled: true,
        memos_url: Some(server.base_url()),
        mem0_enabled: true,
        mem0_url: Some(server.base_url()),
        ..MemoryConfig::default()
    };
    let llm = EchoLLM {
        reply: vec!["你好，很高兴见到你！"],
        ..EchoLLM::default()
    };
    let voice = Voice::new(Arc::new(llm.clone()))
        .memory(MemoryOrchestrator::from_config(&cfg).unwrap());

    let reply = voice.chat(&session(), "你好").await;
    assert_eq!(reply, "你好，很高兴见到你！");
    search.assert_async().await;

    let prompt = llm.seen.lock().unwrap()[0].clone();
    assert_eq!(prompt[0].content, "你是一个语音助手");
    assert_eq!(prompt[1].content, "User Memories:\n- 喜欢下雨天\n");
    assert_eq!(prompt[2].content, "你好");

    for _ in 0..100 {
        if add.hits_async().await == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("memory was never written");
}

#[tokio::test]
async fn unreachable_memory_does_not_change_the_reply() {
    let cfg = MemoryConfig {
        memos_enabled: true,
        memos_url: Some("http://127.0.0.1:9".into()),
        memos_timeout_ms: 200,
        ..MemoryConfig::default()
    };
    let llm = EchoLLM {
        reply: vec!["没问题，马上开始。"],
        ..EchoLLM::default()
    };
    let voice = Voice::new(Arc::new(llm.clone()))
        .memory(MemoryOrchestrator::from_config(&cfg).unwrap());
    let reply = voice.chat(&session(), "开始吧").await;
    assert_eq!(reply, "没问题，马上开始。");
    assert_eq!(llm.seen.lock().unwrap()[0].len(), 2);
}

#[tokio::test]
async fn failed_stream_is_not_persisted() {
    let history = Arc::new(InMemoryHistory::new());
    let llm = EchoLLM {
        reply: vec!["我们先来看看这个问题。", "首先"],
        fail: true,
        ..EchoLLM::default()
    };
    let voice = Voice::new(Arc::new(llm)).history(history.clone());
    let s = session();
    let mut heard = Vec::new();
    let summary = voice
        .chat_stream_by_sentence(&s, "帮我分析", false, |text: &str, _: bool, last: bool| {
            heard.push((text.to_string(), last))
        })
        .await;

    assert!(summary.failed);
    assert_eq!(
        heard,
        vec![
            ("我们先来看看这个问题。".to_string(), false),
            (APOLOGY.to_string(), true)
        ]
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(history.exchanges().is_empty());
    assert!(s.conversation().lock().await.full().is_empty());
}
