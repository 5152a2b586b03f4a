//! OpenAI chat completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capabilities::ModelCapabilities;
use crate::error::{LlmError, Result};
use crate::types::{ChatRequest, ChatResponse, Message, Usage};
use crate::ChatProvider;

/// Pure OpenAI API client.
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    capabilities: ModelCapabilities,
}

impl OpenAIClient {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: impl Into<String>, capabilities: ModelCapabilities) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            capabilities,
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env(capabilities: ModelCapabilities) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key, capabilities))
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn wire_request(&self, request: &ChatRequest) -> WireRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(request.messages.iter().cloned());

        let (max_tokens, max_completion_tokens) =
            if self.capabilities.uses_max_completion_tokens(&request.model) {
                (None, Some(request.max_tokens))
            } else {
                (Some(request.max_tokens), None)
            };

        let temperature = request
            .temperature
            .filter(|_| self.capabilities.supports_temperature(&request.model));

        WireRequest {
            model: request.model.clone(),
            messages,
            temperature,
            max_tokens,
            max_completion_tokens,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let start = std::time::Instant::now();
        let body = self.wire_request(&request);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                LlmError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(LlmError::api(status, error_text));
        }

        let raw: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = raw
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("No choices in OpenAI response".into()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            "OpenAI chat completion"
        );

        Ok(ChatResponse {
            content,
            usage: raw.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = OpenAIClient::new("sk-test", ModelCapabilities::default())
            .with_base_url("https://custom.api.com");

        assert_eq!(client.api_key, "sk-test");
        assert_eq!(client.base_url(), "https://custom.api.com");
    }

    #[test]
    fn test_system_prompt_becomes_leading_message() {
        let client = OpenAIClient::new("sk-test", ModelCapabilities::default());
        let request = ChatRequest::new("gpt-4o-mini")
            .system("review jobs")
            .message(Message::user("[0] Rust Engineer"))
            .max_tokens(256);

        let wire = client.wire_request(&request);
        assert_eq!(wire.messages.len(), 2);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.max_tokens, Some(256));
        assert_eq!(wire.max_completion_tokens, None);
    }

    #[test]
    fn test_reasoning_models_use_completion_token_cap() {
        let client = OpenAIClient::new("sk-test", ModelCapabilities::default());
        let request = ChatRequest::new("gpt-5-mini").temperature(0.3).max_tokens(512);

        let wire = client.wire_request(&request);
        assert_eq!(wire.max_tokens, None);
        assert_eq!(wire.max_completion_tokens, Some(512));
        assert_eq!(wire.temperature, None);
    }

    #[test]
    fn test_parses_wire_response() {
        let raw: WireResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],
                "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        )
        .unwrap();
        assert_eq!(raw.choices[0].message.content.as_deref(), Some("hi"));
        assert_eq!(raw.usage.unwrap().prompt_tokens, 3);
    }
}
