//! `BaseLlm` implementation that picks the vendor from the model name.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use llm_client::{ChatProvider, ChatRequest, Message, Provider};

use super::BaseLlm;

/// Routes `gpt-*` models to OpenAI and everything else to Anthropic.
///
/// A missing provider is a configuration error reported per call, so a
/// deployment with only one key still runs crawlers that use that vendor.
#[derive(Clone, Default)]
pub struct LlmRouter {
    openai: Option<Arc<dyn ChatProvider>>,
    anthropic: Option<Arc<dyn ChatProvider>>,
}

impl LlmRouter {
    pub fn new(
        openai: Option<Arc<dyn ChatProvider>>,
        anthropic: Option<Arc<dyn ChatProvider>>,
    ) -> Self {
        Self { openai, anthropic }
    }

    fn provider_for(&self, model: &str) -> Result<&Arc<dyn ChatProvider>> {
        match Provider::for_model(model) {
            Provider::OpenAI => self
                .openai
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not configured (model {})", model)),
            Provider::Anthropic => self
                .anthropic
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY not configured (model {})", model)),
        }
    }
}

#[async_trait]
impl BaseLlm for LlmRouter {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let provider = self.provider_for(model)?;

        let request = ChatRequest::new(model)
            .system(system_prompt)
            .message(Message::user(user_prompt))
            .temperature(0.2)
            .max_tokens(max_tokens);

        let response = provider.chat(request).await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "LLM call complete"
            );
        }
        Ok(response.content)
    }
}
