//! Conversation history storage
//!
//! Role-tagged messages, each stamped with the stage that handled it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    /// Stage that handled the turn (e.g. "needs_assessment")
    pub stage: Option<String>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, stage: Option<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
            stage,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content, None)
    }

    pub fn handled_by(&self, stage: &str) -> bool {
        self.stage.as_deref() == Some(stage)
    }
}

/// Append-only conversation history for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    messages: VecDeque<ConversationMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push_back(message);
    }

    /// Record both sides of a turn under the stage that handled it
    pub fn record_turn(&mut self, stage: &str, user: &str, assistant: &str) {
        let stage = Some(stage.to_string());
        self.add_message(ConversationMessage::new(MessageRole::User, user, stage.clone()));
        self.add_message(ConversationMessage::new(MessageRole::Assistant, assistant, stage));
    }

    // =============================
    // Iterators (ZERO ALLOCATION)
    // =============================

    pub fn messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    /// The N most recent messages in chronological order, for model context
    pub fn window(&self, count: usize) -> Vec<ConversationMessage> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// User utterances handled by `stage`, newest first
    pub fn user_messages_for<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.messages
            .iter()
            .rev()
            .filter(move |m| m.role == MessageRole::User && m.handled_by(stage))
            .map(|m| m.content.as_str())
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
