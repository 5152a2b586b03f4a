use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::kernel::serper_client::DEFAULT_SERPER_BASE_URL;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub serper_api_key: Option<String>,
    pub serper_base_url: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub sse_port: u16,
    /// Six-field cron for the due-run sweep
    pub tick_cron: String,
    /// Six-field cron for the paused-crawler resume sweep
    pub resume_cron: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
            serper_api_key: optional("SERPER_API_KEY"),
            serper_base_url: optional("SERPER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SERPER_BASE_URL.to_string()),
            openai_api_key: optional("OPENAI_API_KEY"),
            anthropic_api_key: optional("ANTHROPIC_API_KEY"),
            sse_port: env::var("SSE_SERVER_PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .context("SSE_SERVER_PORT must be a valid port")?,
            tick_cron: optional("AUTOMATION_TICK_CRON")
                .unwrap_or_else(|| "0 * * * * *".to_string()),
            resume_cron: optional("AUTOMATION_RESUME_CRON")
                .unwrap_or_else(|| "30 */5 * * * *".to_string()),
        })
    }
}

/// Unset and blank variables are both treated as absent.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
