use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::domains::automation::state::CrawlerState;

/// Default model for review and suggestion calls.
pub const DEFAULT_AUTOMATION_MODEL: &str = "gpt-4o-mini";

/// Search recency filter, mapped to the provider's `tbs` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "search_time_filter", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimeFilter {
    Day,
    Week,
    Month,
}

impl TimeFilter {
    pub fn as_tbs(&self) -> &'static str {
        match self {
            TimeFilter::Day => "qdr:d",
            TimeFilter::Week => "qdr:w",
            TimeFilter::Month => "qdr:m",
        }
    }
}

/// A tenant's recurring job-search crawler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct AutomationConfig {
    pub id: i64,
    pub tenant_id: i64,
    pub user_id: i64,
    #[builder(default)]
    pub name: String,
    #[builder(default)]
    pub state: CrawlerState,
    #[builder(default = 60)]
    pub interval_minutes: i32,
    #[builder(default = 10)]
    pub compilation_target: i32,
    #[builder(default = "job".to_string())]
    pub entity_type: String,

    // Search query
    pub search_query: String,
    #[builder(default)]
    pub suggested_query: Option<String>,
    #[builder(default)]
    pub use_suggested_query: bool,

    // Review prompt
    #[builder(default)]
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub suggested_prompt: Option<String>,
    #[builder(default)]
    pub use_suggested_prompt: bool,
    #[builder(default)]
    pub prompt_updated_at: Option<DateTime<Utc>>,

    // Query building
    #[builder(default)]
    pub location: Option<String>,
    #[builder(default)]
    pub country: Option<String>,
    #[builder(default)]
    pub ats_mode: bool,
    #[builder(default)]
    pub time_filter: Option<TimeFilter>,
    #[builder(default)]
    pub excluded_terms: Vec<String>,
    #[builder(default)]
    pub document_ids: Vec<i64>,

    // Agent / analytics
    #[builder(default)]
    pub use_agent: bool,
    #[builder(default)]
    pub use_analytics: bool,
    #[builder(default = DEFAULT_AUTOMATION_MODEL.to_string())]
    pub agent_model: String,
    #[builder(default = DEFAULT_AUTOMATION_MODEL.to_string())]
    pub analytics_model: String,

    // Lifecycle
    #[builder(default)]
    pub disable_on_compiled: bool,
    #[builder(default)]
    pub empty_run_limit: Option<i32>,
    #[builder(default)]
    pub consecutive_zero_runs: i32,

    // Prompt suggestion gating
    #[builder(default)]
    pub suggestion_threshold: Option<f64>,
    #[builder(default)]
    pub min_prospects_threshold: Option<i32>,
    #[builder(default)]
    pub prompt_cooldown_runs: i32,
    #[builder(default)]
    pub prompt_cooldown_prospects: i32,

    #[builder(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub compiled_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl AutomationConfig {
    /// Query this run executes: the suggestion when it has been switched on.
    pub fn active_query(&self) -> &str {
        match self.suggested_query.as_deref().map(str::trim) {
            Some(q) if self.use_suggested_query && !q.is_empty() => q,
            _ => self.search_query.trim(),
        }
    }

    /// Tenant review prompt this run uses, if any.
    pub fn active_prompt(&self) -> Option<&str> {
        let suggested = self
            .suggested_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        match suggested {
            Some(p) if self.use_suggested_prompt => Some(p),
            _ => self
                .system_prompt
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty()),
        }
    }

    /// A query suggestion exists that nobody has switched on yet.
    pub fn has_pending_query_suggestion(&self) -> bool {
        self.suggested_query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty())
            && !self.use_suggested_query
    }

    /// A prompt suggestion exists that nobody has switched on yet.
    pub fn has_pending_prompt_suggestion(&self) -> bool {
        self.suggested_prompt
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
            && !self.use_suggested_prompt
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Run interval, never shorter than one minute.
    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes.max(1)))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM automation_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Claim every active config whose `next_run_at` has passed.
    ///
    /// `next_run_at` is advanced by one interval inside the same statement and
    /// rows locked by a concurrent tick are skipped, so a config is returned to
    /// at most one caller per due slot.
    pub async fn claim_due(now: DateTime<Utc>, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE automation_configs
            SET next_run_at = $1 + make_interval(mins => interval_minutes),
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM automation_configs
                WHERE state = 'active'
                  AND next_run_at IS NOT NULL
                  AND next_run_at <= $1
                ORDER BY next_run_at
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Claim the next-run slot of one active config for an on-demand run.
    pub async fn claim_one(id: i64, now: DateTime<Utc>, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE automation_configs
            SET next_run_at = $2 + make_interval(mins => interval_minutes),
                updated_at = NOW()
            WHERE id = $1 AND state = 'active'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_paused(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM automation_configs WHERE state = 'paused' ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_next_run(
        id: i64,
        next_run_at: Option<DateTime<Utc>>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE automation_configs SET next_run_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(next_run_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_state(
        id: i64,
        state: CrawlerState,
        next_run_at: Option<DateTime<Utc>>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_configs
            SET state = $2, next_run_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(state)
        .bind(next_run_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_compiled(id: i64, at: DateTime<Utc>, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE automation_configs SET compiled_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_run_started(id: i64, at: DateTime<Utc>, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE automation_configs SET last_run_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_consecutive_zero_runs(id: i64, count: i32, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_configs
            SET consecutive_zero_runs = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(count)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Store a new query suggestion; it stays inactive until switched on.
    ///
    /// A suggestion already in use is promoted to `search_query` first, so the
    /// query the crawler runs does not change.
    pub async fn save_query_suggestion(id: i64, query: &str, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_configs
            SET search_query = CASE
                    WHEN use_suggested_query AND COALESCE(BTRIM(suggested_query), '') <> ''
                    THEN BTRIM(suggested_query)
                    ELSE search_query
                END,
                suggested_query = $2,
                use_suggested_query = FALSE,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(query)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Store a new prompt suggestion and restart the prompt cooldown window.
    ///
    /// An in-use prompt suggestion is promoted to `system_prompt` first.
    pub async fn save_prompt_suggestion(
        id: i64,
        prompt: &str,
        at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_configs
            SET system_prompt = CASE
                    WHEN use_suggested_prompt AND COALESCE(BTRIM(suggested_prompt), '') <> ''
                    THEN BTRIM(suggested_prompt)
                    ELSE system_prompt
                END,
                suggested_prompt = $2,
                use_suggested_prompt = FALSE,
                prompt_updated_at = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(prompt)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Switch on any suggestion that is waiting for a decision.
    pub async fn activate_pending_suggestions(id: i64, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_configs
            SET use_suggested_query = use_suggested_query
                    OR COALESCE(BTRIM(suggested_query), '') <> '',
                use_suggested_prompt = use_suggested_prompt
                    OR COALESCE(BTRIM(suggested_prompt), '') <> '',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
