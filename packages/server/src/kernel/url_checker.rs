use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::BaseUrlChecker;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; JobCrawler/1.0)";

/// HEAD-request liveness checker backed by reqwest.
pub struct HttpUrlChecker {
    client: reqwest::Client,
}

impl HttpUrlChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl BaseUrlChecker for HttpUrlChecker {
    async fn head_status(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;
        Ok(response.status().as_u16())
    }
}
