use ollama_rs::generation::chat::ChatMessage;

/// Tracks messages exchanged with the LLM.
///
/// [`Conversation`] retains the full history while exposing
/// a sliding window via [`tail`](Self::tail). Prompts are assembled from the
/// system prompt, the tail and the new user message.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    system_prompt: Option<String>,
    history: Vec<ChatMessage>,
    max_tail_len: usize,
}

impl Conversation {
    /// Create a new conversation keeping `max_tail_len` messages in the tail.
    pub fn new(system_prompt: Option<String>, max_tail_len: usize) -> Self {
        Self {
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
            history: Vec::new(),
            max_tail_len,
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Append a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content.into()));
    }

    /// Append an assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content.into()));
    }

    /// Append one completed exchange.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.push_user(user);
        self.push_assistant(assistant);
    }

    /// Return the most recent messages up to the configured limit.
    pub fn tail(&self) -> Vec<ChatMessage> {
        let start = self.history.len().saturating_sub(self.max_tail_len);
        self.history[start..].to_vec()
    }

    /// Messages to send for a new user turn.
    ///
    /// The system prompt, when set, is always at index 0.
    pub fn prompt(&self, user_message: &str) -> Vec<ChatMessage> {
        let mut msgs = Vec::with_capacity(self.max_tail_len + 2);
        if let Some(sys) = &self.system_prompt {
            msgs.push(ChatMessage::system(sys.clone()));
        }
        msgs.extend(self.tail());
        msgs.push(ChatMessage::user(user_message.to_string()));
        msgs
    }

    /// Full conversation history.
    pub fn full(&self) -> &[ChatMessage] {
        &self.history
    }
}
