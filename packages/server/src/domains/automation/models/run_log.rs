use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "automation_run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Done,
    Failed,
}

/// One execution attempt of a crawler. Immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RunLog {
    pub id: i64,
    pub config_id: i64,
    pub status: RunStatus,
    pub executed_query: String,
    pub executed_prompt: Option<String>,
    pub prompt_chars: i32,
    pub query_changed: bool,
    pub prompt_changed: bool,
    pub prospects_found: i32,
    pub proposals_created: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Audit data captured when a run starts.
#[derive(Debug, Clone)]
pub struct NewRunLog {
    pub config_id: i64,
    pub executed_query: String,
    pub executed_prompt: Option<String>,
    pub query_changed: bool,
    pub prompt_changed: bool,
}

impl NewRunLog {
    pub fn prompt_chars(&self) -> i32 {
        self.executed_prompt
            .as_deref()
            .map(|p| i32::try_from(p.chars().count()).unwrap_or(i32::MAX))
            .unwrap_or(0)
    }
}

/// Final counters written when a run ends.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub prospects_found: i32,
    pub proposals_created: i32,
    pub error_message: Option<String>,
}

/// Aggregated results per executed query, used for query analytics.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct QueryPerformance {
    pub query: String,
    pub runs: i64,
    pub prospects: i64,
    pub proposals: i64,
}

impl QueryPerformance {
    /// Proposals per prospect, as a percentage.
    pub fn conversion_rate(&self) -> f64 {
        if self.prospects <= 0 {
            return 0.0;
        }
        self.proposals as f64 / self.prospects as f64 * 100.0
    }
}

impl RunLog {
    pub async fn has_running(config_id: i64, pool: &PgPool) -> Result<bool> {
        let (running,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM automation_run_logs
                WHERE config_id = $1 AND status = 'running'
            )
            "#,
        )
        .bind(config_id)
        .fetch_one(pool)
        .await?;
        Ok(running)
    }

    pub async fn create(new: &NewRunLog, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO automation_run_logs
                (config_id, status, executed_query, executed_prompt, prompt_chars,
                 query_changed, prompt_changed)
            VALUES ($1, 'running', $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.config_id)
        .bind(&new.executed_query)
        .bind(&new.executed_prompt)
        .bind(new.prompt_chars())
        .bind(new.query_changed)
        .bind(new.prompt_changed)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Complete a running log. Completed logs are never touched again.
    pub async fn complete(id: i64, completion: &RunCompletion, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_run_logs
            SET status = $2,
                prospects_found = $3,
                proposals_created = $4,
                error_message = $5,
                completed_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(completion.status)
        .bind(completion.prospects_found)
        .bind(completion.proposals_created)
        .bind(&completion.error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_last_completed(config_id: i64, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM automation_run_logs
            WHERE config_id = $1 AND status <> 'running'
            ORDER BY started_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(config_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_completed_since(
        config_id: i64,
        since: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM automation_run_logs
            WHERE config_id = $1 AND status <> 'running' AND started_at >= $2
            ORDER BY started_at
            "#,
        )
        .bind(config_id)
        .bind(since)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn query_performance(config_id: i64, pool: &PgPool) -> Result<Vec<QueryPerformance>> {
        sqlx::query_as::<_, QueryPerformance>(
            r#"
            SELECT executed_query AS query,
                   COUNT(*) AS runs,
                   COALESCE(SUM(prospects_found), 0)::BIGINT AS prospects,
                   COALESCE(SUM(proposals_created), 0)::BIGINT AS proposals
            FROM automation_run_logs
            WHERE config_id = $1 AND status = 'done'
            GROUP BY executed_query
            ORDER BY proposals DESC, runs DESC
            "#,
        )
        .bind(config_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
