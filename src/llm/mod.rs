//! Language model capability
//!
//! The core treats text generation as an opaque call that either returns a
//! complete reply or an error. It never computes numbers.

use crate::memory::ConversationMessage;
use crate::Result;
use async_trait::async_trait;

pub mod gemini;
pub use gemini::GeminiClient;

#[cfg(test)]
pub mod scripted;
#[cfg(test)]
pub use scripted::ScriptedLanguageModel;

/// Sampling parameters for a single call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 400,
        }
    }
}

/// Trait for reply generation (LLM controlled)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ConversationMessage],
        user_message: &str,
        params: &SamplingParams,
    ) -> Result<String>;
}
