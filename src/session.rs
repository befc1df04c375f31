use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::conversation::Conversation;

/// One user's chat session.
///
/// Cloning is cheap and every clone shares the same conversation, so a
/// background task can record the finished exchange after the turn returns.
#[derive(Clone, Debug)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub user_id: String,
    conversation: Arc<Mutex<Conversation>>,
}

impl ChatSession {
    pub fn new(user_id: impl Into<String>, conversation: Conversation) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            conversation: Arc::new(Mutex::new(conversation)),
        }
    }

    /// Shared conversation state.
    pub fn conversation(&self) -> &Arc<Mutex<Conversation>> {
        &self.conversation
    }

    /// Start a turn, returning the time the user message arrived.
    pub fn begin_turn(&self) -> DateTime<Utc> {
        let now = Utc::now();
        tracing::debug!(session_id = %self.session_id, user_id = %self.user_id, "turn started");
        now
    }
}
