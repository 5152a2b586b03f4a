//! Read-only views over CRM records the crawler must not propose again.
//!
//! The `jobs` and `proposals` tables belong to the CRM; the automation engine
//! only reads URL / company / title out of them for deduplication and counts
//! proposals it created itself.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// A job already known to the tenant, from a job record or a proposal payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnownJob {
    pub url: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
}

impl KnownJob {
    pub fn new(url: &str, company: &str, title: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            company: Some(company.to_string()),
            title: Some(title.to_string()),
        }
    }

    pub async fn find_job_records(tenant_id: i64, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT url, company, title FROM jobs WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_pending_proposals(tenant_id: i64, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT payload->>'url' AS url,
                   payload->>'company' AS company,
                   payload->>'title' AS title
            FROM proposals
            WHERE tenant_id = $1 AND status = 'pending'
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_user_rejected_urls(tenant_id: i64, pool: &PgPool) -> Result<Vec<String>> {
        let rows: Vec<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT payload->>'url'
            FROM proposals
            WHERE tenant_id = $1 AND status = 'rejected'
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().filter_map(|(url,)| url).collect())
    }
}

/// Proposal counts for one crawler.
pub struct ProposalCounts;

impl ProposalCounts {
    /// Proposals still awaiting a decision.
    pub async fn pending(config_id: i64, pool: &PgPool) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM proposals
            WHERE automation_config_id = $1 AND status = 'pending'
            "#,
        )
        .bind(config_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Proposals that still count toward the target (pending or approved).
    pub async fn active(config_id: i64, pool: &PgPool) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM proposals
            WHERE automation_config_id = $1 AND status IN ('pending', 'approved')
            "#,
        )
        .bind(config_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
