//! Scripted language model for conversation tests

use super::{LanguageModel, SamplingParams};
use crate::error::AssistantError;
use crate::memory::ConversationMessage;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A prompt as seen by the scripted model
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_message: String,
    pub history_len: usize,
    pub params: SamplingParams,
}

/// Replays queued replies in order
#[derive(Default)]
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLanguageModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(AssistantError::LlmError(message.into())));
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ConversationMessage],
        user_message: &str,
        params: &SamplingParams,
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                system_prompt: system_prompt.to_string(),
                user_message: user_message.to_string(),
                history_len: history.len(),
                params: *params,
            });
        }

        self.replies
            .lock()
            .map_err(|_| AssistantError::LlmError("Scripted model poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(AssistantError::LlmError("No scripted reply left".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let model = ScriptedLanguageModel::new(["first", "second"]);
        model.push_failure("boom");
        let params = SamplingParams::default();

        assert_eq!(model.generate("sys", &[], "a", &params).await.unwrap(), "first");
        assert_eq!(model.generate("sys", &[], "b", &params).await.unwrap(), "second");
        assert!(model.generate("sys", &[], "c", &params).await.is_err());
        // exhausted
        assert!(model.generate("sys", &[], "d", &params).await.is_err());

        let calls = model.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1].user_message, "b");
    }
}
