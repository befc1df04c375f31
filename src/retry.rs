use crate::llm_client::{LLMClient, LlmError, TokenStream};
use async_trait::async_trait;
use ollama_rs::generation::chat::ChatMessage;
use std::time::Duration;

/// Policy controlling how many times an operation is retried and the delay
/// between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of additional attempts to make after the first failure.
    pub max_retries: usize,
    /// Delay between retry attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new policy.
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Execute `op` retrying on error according to the policy.
    pub async fn retry<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempts < self.max_retries => {
                    attempts += 1;
                    tracing::warn!(error = %e, attempt = attempts, "retrying llm call");
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wrapper around an [`LLMClient`] that applies a [`RetryPolicy`].
///
/// Only opening the stream is retried. Once tokens have been handed out a
/// failure is final, since the listener may already have heard part of the
/// reply.
#[derive(Clone)]
pub struct RetryLLM<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryLLM<C> {
    /// Construct a new retrying LLM client.
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C> LLMClient for RetryLLM<C>
where
    C: LLMClient,
{
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        self.policy.retry(|| self.inner.chat_stream(messages)).await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.policy.retry(|| self.inner.chat(messages)).await
    }
}
