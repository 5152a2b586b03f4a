//! Pure LLM REST API clients
//!
//! Minimal clients for the OpenAI chat completions API and the Anthropic
//! messages API, with no domain-specific logic. Both sit behind the
//! [`ChatProvider`] trait so callers can route by model name.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_client::{ChatProvider, ChatRequest, Message, ModelCapabilities, OpenAIClient};
//!
//! let client = OpenAIClient::from_env(ModelCapabilities::default())?;
//!
//! let response = client
//!     .chat(
//!         ChatRequest::new("gpt-4o-mini")
//!             .system("You are terse.")
//!             .message(Message::user("Hello!"))
//!             .max_tokens(64),
//!     )
//!     .await?;
//! ```

pub mod anthropic;
pub mod capabilities;
pub mod error;
pub mod openai;
pub mod types;

pub use anthropic::AnthropicClient;
pub use capabilities::ModelCapabilities;
pub use error::{LlmError, Result};
pub use openai::OpenAIClient;
pub use types::*;

use async_trait::async_trait;

/// A chat-capable LLM backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a chat request and return the assistant's text.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// LLM vendor implied by a model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    /// Pick the provider from the model name: `gpt-*` goes to OpenAI,
    /// everything else to Anthropic.
    pub fn for_model(model: &str) -> Self {
        if model.trim().to_ascii_lowercase().starts_with("gpt-") {
            Provider::OpenAI
        } else {
            Provider::Anthropic
        }
    }
}
