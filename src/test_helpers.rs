#![cfg(test)]

use crate::llm_client::{LLMClient, LlmError, Token, TokenStream};
use async_trait::async_trait;
use futures::stream;
use ollama_rs::generation::chat::ChatMessage;
use std::sync::{Arc, Mutex};

/// [`LLMClient`] that replays a fixed script of tokens and records every
/// prompt it is sent.
#[derive(Clone, Default)]
pub struct ScriptedLLM {
    script: Vec<Result<Token, String>>,
    open_error: Option<String>,
    prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedLLM {
    /// Streams `tokens` in order, then completes.
    pub fn new<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            script: tokens.into_iter().map(|t| Ok(Token::new(t))).collect(),
            ..Self::default()
        }
    }

    /// Attaches `tool` to the token at `index`.
    pub fn with_tool_at(mut self, index: usize, tool: &str) -> Self {
        if let Some(Ok(tok)) = self.script.get_mut(index) {
            tok.tool_name = Some(tool.to_string());
        }
        self
    }

    /// Ends the stream with an error after the scripted tokens.
    pub fn then_fail(mut self, msg: &str) -> Self {
        self.script.push(Err(msg.to_string()));
        self
    }

    /// Fails before any token is produced.
    pub fn unreachable(msg: &str) -> Self {
        Self {
            open_error: Some(msg.to_string()),
            ..Self::default()
        }
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLM {
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if let Some(msg) = &self.open_error {
            return Err(LlmError::Request(msg.clone()));
        }
        let items: Vec<_> = self
            .script
            .iter()
            .cloned()
            .map(|r| r.map_err(LlmError::Stream))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}
