use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{BaseSearchService, OrganicResult, SearchRequest, SearchResponse};

pub const DEFAULT_SERPER_BASE_URL: &str = "https://google.serper.dev";

/// Serper (Google search) API client
pub struct SerperClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

/// Serper API response
#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
    #[serde(default, rename = "relatedSearches")]
    related_searches: Vec<RelatedSearch>,
}

#[derive(Debug, Deserialize)]
struct RelatedSearch {
    #[serde(default)]
    query: String,
}

impl SerperClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_SERPER_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl BaseSearchService for SerperClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to send Serper search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Serper API error {}: {}", status, body);
        }

        let serper_response: SerperResponse = response
            .json()
            .await
            .context("Failed to parse Serper response")?;

        tracing::debug!(
            q = %request.q,
            organic = serper_response.organic.len(),
            related = serper_response.related_searches.len(),
            "Serper search complete"
        );

        Ok(SearchResponse {
            organic: serper_response.organic,
            related_searches: serper_response
                .related_searches
                .into_iter()
                .map(|r| r.query)
                .filter(|q| !q.trim().is_empty())
                .collect(),
        })
    }
}

/// Stand-in used when no Serper API key is configured. Every search fails,
/// so runs are recorded as failed empty runs instead of silently succeeding.
pub struct NoopSearchService;

#[async_trait]
impl BaseSearchService for NoopSearchService {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        tracing::warn!(q = %request.q, "search called but no Serper API key configured");
        anyhow::bail!("SERPER_API_KEY not configured")
    }
}
