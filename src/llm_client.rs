use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use ollama_rs::generation::chat::ChatMessage;
use thiserror::Error;

/// Failures surfaced by an [`LLMClient`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// The call could not be started.
    #[error("model request failed: {0}")]
    Request(String),
    /// The response stream broke off.
    #[error("model stream failed: {0}")]
    Stream(String),
    /// The model answered without any text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Text delta emitted by a model stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    /// Raw text for the delta. May be empty.
    pub text: String,
    /// Name of the tool the provider reports for this delta, if any.
    pub tool_name: Option<String>,
}

impl Token {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_name: None,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }
}

/// Ordered stream of deltas. It ends on completion; an `Err` item is terminal.
pub type TokenStream = BoxStream<'static, Result<Token, LlmError>>;

/// Common interface for chat-based LLMs.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Streams text fragments in response to chat messages.
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError>;

    /// Returns the complete reply in one piece.
    ///
    /// The default implementation drains [`chat_stream`](Self::chat_stream).
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut stream = self.chat_stream(messages).await?;
        let mut out = String::new();
        while let Some(tok) = stream.next().await {
            out.push_str(&tok?.text);
        }
        tracing::debug!(%out, "llm full response");
        if out.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(out)
    }
}
