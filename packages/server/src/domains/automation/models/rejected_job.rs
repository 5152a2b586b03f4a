use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// A search hit the reviewer turned down. Unique per (config, URL).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RejectedJob {
    pub id: i64,
    pub config_id: i64,
    pub url: String,
    pub title: String,
    pub company: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRejectedJob {
    pub config_id: i64,
    pub url: String,
    pub title: String,
    pub company: String,
    pub reason: String,
}

impl RejectedJob {
    /// Insert unless the URL was already rejected for this config.
    ///
    /// Returns `true` when a row was written.
    pub async fn insert_if_absent(job: &NewRejectedJob, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO automation_rejected_jobs (config_id, url, title, company, reason)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (config_id, url) DO NOTHING
            "#,
        )
        .bind(job.config_id)
        .bind(&job.url)
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_urls_by_config(config_id: i64, pool: &PgPool) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT url FROM automation_rejected_jobs WHERE config_id = $1")
                .bind(config_id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    pub async fn find_recent(config_id: i64, limit: i64, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM automation_rejected_jobs
            WHERE config_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(config_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
