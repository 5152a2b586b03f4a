// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (dedup, review, suggestions) lives in the automation domain
// and talks to the outside world through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseLlm, BaseSearchService)

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Search Service Trait (Infrastructure)
// =============================================================================

/// Search provider request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchRequest {
    pub q: String,
    pub gl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One organic search hit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Parsed search response: organic hits plus the provider's related searches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub organic: Vec<OrganicResult>,
    pub related_searches: Vec<String>,
}

#[async_trait]
pub trait BaseSearchService: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

// =============================================================================
// LLM Trait (Infrastructure - Generic completion)
// =============================================================================

#[async_trait]
pub trait BaseLlm: Send + Sync {
    /// Complete a system + user prompt pair with the given model.
    ///
    /// The provider is implied by the model name.
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String>;
}

// =============================================================================
// URL Checker Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseUrlChecker: Send + Sync {
    /// Issue a HEAD request and return the final HTTP status code.
    async fn head_status(&self, url: &str) -> Result<u16>;
}

// =============================================================================
// Proposal Creator Trait (CRM collaborator)
// =============================================================================

/// A proposal handed to the CRM's approval workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProposal {
    pub tenant_id: i64,
    pub user_id: i64,
    pub entity_type: String,
    pub action: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub source: Option<String>,
    pub automation_config_id: Option<i64>,
}

#[async_trait]
pub trait BaseProposalCreator: Send + Sync {
    /// Create a proposal and return its id.
    async fn create_proposal(&self, proposal: NewProposal) -> Result<i64>;
}

// =============================================================================
// Document Loader Trait (CRM collaborator)
// =============================================================================

/// Raw document as stored by the document service.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResult {
    pub content: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

#[async_trait]
pub trait BaseDocumentLoader: Send + Sync {
    async fn get_document_by_id(&self, id: i64) -> Result<Option<DocumentResult>>;
}

// =============================================================================
// Notifier Trait (Infrastructure)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The crawler reached its proposal target.
    Compiled,
    /// The crawler was switched off after too many empty runs.
    AutoDisabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub tenant_id: i64,
    pub user_id: i64,
    pub config_id: i64,
    pub kind: NotificationKind,
    pub message: String,
}

#[async_trait]
pub trait BaseNotifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}
