//! Translation collaborators

use super::Translator;
use crate::llm::{LanguageModel, SamplingParams};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Returns text unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str, _source_lang: &str, _target_lang: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Translation through the configured language model
pub struct LlmTranslator {
    llm: Arc<dyn LanguageModel>,
    params: SamplingParams,
}

impl LlmTranslator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            params: SamplingParams {
                temperature: 0.0,
                max_tokens: 600,
            },
        }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        if source_lang == target_lang || text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let prompt = format!(
            "Translate the user's message from language code '{}' to language code '{}'. \
             Keep numbers, currency amounts and file paths exactly as written. \
             Reply with the translation only.",
            source_lang, target_lang
        );
        let translated = self.llm.generate(&prompt, &[], text, &self.params).await?;
        Ok(translated.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLanguageModel;

    #[tokio::test]
    async fn test_passthrough() {
        let text = PassthroughTranslator.translate("नमस्ते", "hi", "en").await.unwrap();
        assert_eq!(text, "नमस्ते");
    }

    #[tokio::test]
    async fn test_llm_translation_skips_same_language() {
        let model = Arc::new(ScriptedLanguageModel::new([" Hello "]));
        let translator = LlmTranslator::new(model.clone());

        assert_eq!(translator.translate("hi", "en", "en").await.unwrap(), "hi");
        assert!(model.calls().is_empty());

        assert_eq!(translator.translate("नमस्ते", "hi", "en").await.unwrap(), "Hello");
        assert!(model.calls()[0].system_prompt.contains("'hi' to language code 'en'"));
    }
}
