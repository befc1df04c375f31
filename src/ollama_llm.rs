use crate::llm_client::{LLMClient, LlmError, Token, TokenStream};
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    Ollama,
    generation::chat::{ChatMessage, ChatMessageResponseStream, request::ChatMessageRequest},
};
use url::Url;

/// Build a chat request for the given model and messages.
fn build_request(model: &str, messages: &[ChatMessage]) -> ChatMessageRequest {
    ChatMessageRequest::new(model.to_string(), messages.to_vec())
}

/// Name of the first tool call attached to `message`, if any.
///
/// Read through the serialized form so it keeps working across provider
/// message layouts.
fn tool_name(message: &ChatMessage) -> Option<String> {
    let value = serde_json::to_value(message).ok()?;
    value
        .get("tool_calls")?
        .as_array()?
        .iter()
        .find_map(|call| call.pointer("/function/name")?.as_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Map an Ollama response stream into a [`TokenStream`].
fn map_stream(stream: ChatMessageResponseStream) -> TokenStream {
    let mapped = stream.map(|res| match res {
        Ok(resp) => {
            let tool_name = tool_name(&resp.message);
            let text = resp.message.content;
            tracing::trace!(%text, "llm token");
            Ok(Token { text, tool_name })
        }
        Err(e) => {
            tracing::error!(?e, "ollama stream error");
            Err(LlmError::Stream(format!("{e:?}")))
        }
    });
    Box::pin(mapped)
}

/// [`LLMClient`] implementation backed by [`Ollama`].
#[derive(Clone)]
pub struct OllamaLLM {
    client: Ollama,
    model: String,
}

impl OllamaLLM {
    /// Creates a new Ollama-backed client.
    pub fn new(client: Ollama, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Creates a client for the server at `base_url`, e.g.
    /// `http://localhost:11434`.
    pub fn from_base_url(base_url: &str, model: impl Into<String>) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("no host in llm url: {base_url}"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("no port in llm url: {base_url}"))?;
        let client = Ollama::new_with_client(
            format!("{}://{}", url.scheme(), host),
            port,
            reqwest::Client::new(),
        );
        Ok(Self::new(client, model))
    }

    /// Returns the configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LLMClient for OllamaLLM {
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let req = build_request(&self.model, messages);
        let stream = self
            .client
            .send_chat_messages_stream(req)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        Ok(map_stream(stream))
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let req = build_request(&self.model, messages);
        let resp = self
            .client
            .send_chat_messages(req)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let text = resp.message.content;
        tracing::debug!(%text, "llm full response");
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn llm_for(server: &MockServer) -> OllamaLLM {
        OllamaLLM::from_base_url(&server.base_url(), "m").unwrap()
    }

    #[tokio::test]
    async fn yields_all_tokens() {
        let server = MockServer::start_async().await;
        let body = concat!(
            "{\"model\":\"m\",\"created_at\":\"n\",\"message\":{\"role\":\"assistant\",\"content\":\"he\"},\"done\":false}\n",
            "{\"model\":\"m\",\"created_at\":\"n\",\"message\":{\"role\":\"assistant\",\"content\":\"llo\"},\"done\":true}"
        );
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).body(body);
            })
            .await;

        let llm = llm_for(&server);
        let msgs = [ChatMessage::user("hi".into())];
        let mut stream = llm.chat_stream(&msgs).await.unwrap();
        let mut collected = String::new();
        while let Some(tok) = stream.next().await {
            let tok = tok.unwrap();
            assert_eq!(tok.tool_name, None);
            collected.push_str(&tok.text);
        }
        assert_eq!(collected, "hello");
    }

    #[tokio::test]
    async fn chat_returns_whole_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).body(
                    "{\"model\":\"m\",\"created_at\":\"n\",\"message\":{\"role\":\"assistant\",\"content\":\"hello there\"},\"done\":true}",
                );
            })
            .await;

        let llm = llm_for(&server);
        let text = llm.chat(&[ChatMessage::user("hi".into())]).await.unwrap();
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn server_errors_are_request_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("boom");
            })
            .await;

        let llm = llm_for(&server);
        let err = llm.chat(&[ChatMessage::user("hi".into())]).await.unwrap_err();
        assert!(matches!(err, LlmError::Request(_)));
    }

    #[test]
    fn plain_messages_have_no_tool() {
        assert_eq!(tool_name(&ChatMessage::assistant("hi".into())), None);
    }

    #[test]
    fn rejects_urls_without_host() {
        assert!(OllamaLLM::from_base_url("not a url", "m").is_err());
    }
}
