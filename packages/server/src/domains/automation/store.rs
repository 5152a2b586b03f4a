//! Persistence surface of the automation engine.
//!
//! `BaseAutomationStore` is everything the orchestrator reads or writes;
//! `PgAutomationStore` backs it with the sqlx models. Tests use
//! `kernel::test_dependencies::InMemoryAutomationStore`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::models::{
    AutomationConfig, KnownJob, NewRejectedJob, NewRunLog, ProposalCounts, QueryPerformance,
    RejectedJob, RunCompletion, RunLog,
};
use super::state::CrawlerState;

#[async_trait]
pub trait BaseAutomationStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Configs
    // -------------------------------------------------------------------------

    /// Atomically claim all due active configs, advancing their `next_run_at`.
    async fn claim_due_configs(&self, now: DateTime<Utc>) -> Result<Vec<AutomationConfig>>;

    /// Atomically claim the next-run slot of one active config.
    async fn claim_config(&self, id: i64, now: DateTime<Utc>) -> Result<Option<AutomationConfig>>;

    async fn find_config(&self, id: i64) -> Result<Option<AutomationConfig>>;
    async fn find_paused_configs(&self) -> Result<Vec<AutomationConfig>>;
    async fn set_next_run(&self, id: i64, next_run_at: Option<DateTime<Utc>>) -> Result<()>;
    async fn set_state(
        &self,
        id: i64,
        state: CrawlerState,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn mark_compiled(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
    async fn mark_run_started(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
    async fn set_consecutive_zero_runs(&self, id: i64, count: i32) -> Result<()>;
    async fn save_query_suggestion(&self, id: i64, query: &str) -> Result<()>;
    async fn save_prompt_suggestion(&self, id: i64, prompt: &str, at: DateTime<Utc>) -> Result<()>;
    async fn activate_pending_suggestions(&self, id: i64) -> Result<()>;

    // -------------------------------------------------------------------------
    // Run logs
    // -------------------------------------------------------------------------

    async fn has_running_run(&self, config_id: i64) -> Result<bool>;
    async fn create_run_log(&self, new: NewRunLog) -> Result<RunLog>;
    async fn complete_run_log(&self, run_id: i64, completion: RunCompletion) -> Result<()>;
    async fn last_completed_run(&self, config_id: i64) -> Result<Option<RunLog>>;
    async fn completed_runs_since(
        &self,
        config_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<RunLog>>;
    async fn query_performance(&self, config_id: i64) -> Result<Vec<QueryPerformance>>;

    // -------------------------------------------------------------------------
    // Proposals and dedup sources
    // -------------------------------------------------------------------------

    async fn pending_proposal_count(&self, config_id: i64) -> Result<i64>;
    async fn active_proposal_count(&self, config_id: i64) -> Result<i64>;
    async fn existing_jobs(&self, tenant_id: i64) -> Result<Vec<KnownJob>>;
    async fn pending_proposals(&self, tenant_id: i64) -> Result<Vec<KnownJob>>;
    async fn user_rejected_urls(&self, tenant_id: i64) -> Result<Vec<String>>;
    async fn rejected_job_urls(&self, config_id: i64) -> Result<Vec<String>>;

    // -------------------------------------------------------------------------
    // Rejected jobs
    // -------------------------------------------------------------------------

    /// Returns `false` when the (config, URL) pair was already recorded.
    async fn record_rejected_job(&self, job: NewRejectedJob) -> Result<bool>;
    async fn recent_rejected_jobs(&self, config_id: i64, limit: i64) -> Result<Vec<RejectedJob>>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgAutomationStore {
    pool: PgPool,
}

impl PgAutomationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseAutomationStore for PgAutomationStore {
    async fn claim_due_configs(&self, now: DateTime<Utc>) -> Result<Vec<AutomationConfig>> {
        AutomationConfig::claim_due(now, &self.pool).await
    }

    async fn claim_config(&self, id: i64, now: DateTime<Utc>) -> Result<Option<AutomationConfig>> {
        AutomationConfig::claim_one(id, now, &self.pool).await
    }

    async fn find_config(&self, id: i64) -> Result<Option<AutomationConfig>> {
        AutomationConfig::find_by_id(id, &self.pool).await
    }

    async fn find_paused_configs(&self) -> Result<Vec<AutomationConfig>> {
        AutomationConfig::find_paused(&self.pool).await
    }

    async fn set_next_run(&self, id: i64, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        AutomationConfig::set_next_run(id, next_run_at, &self.pool).await
    }

    async fn set_state(
        &self,
        id: i64,
        state: CrawlerState,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        AutomationConfig::set_state(id, state, next_run_at, &self.pool).await
    }

    async fn mark_compiled(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        AutomationConfig::mark_compiled(id, at, &self.pool).await
    }

    async fn mark_run_started(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        AutomationConfig::mark_run_started(id, at, &self.pool).await
    }

    async fn set_consecutive_zero_runs(&self, id: i64, count: i32) -> Result<()> {
        AutomationConfig::set_consecutive_zero_runs(id, count, &self.pool).await
    }

    async fn save_query_suggestion(&self, id: i64, query: &str) -> Result<()> {
        AutomationConfig::save_query_suggestion(id, query, &self.pool).await
    }

    async fn save_prompt_suggestion(&self, id: i64, prompt: &str, at: DateTime<Utc>) -> Result<()> {
        AutomationConfig::save_prompt_suggestion(id, prompt, at, &self.pool).await
    }

    async fn activate_pending_suggestions(&self, id: i64) -> Result<()> {
        AutomationConfig::activate_pending_suggestions(id, &self.pool).await
    }

    async fn has_running_run(&self, config_id: i64) -> Result<bool> {
        RunLog::has_running(config_id, &self.pool).await
    }

    async fn create_run_log(&self, new: NewRunLog) -> Result<RunLog> {
        RunLog::create(&new, &self.pool).await
    }

    async fn complete_run_log(&self, run_id: i64, completion: RunCompletion) -> Result<()> {
        RunLog::complete(run_id, &completion, &self.pool).await
    }

    async fn last_completed_run(&self, config_id: i64) -> Result<Option<RunLog>> {
        RunLog::find_last_completed(config_id, &self.pool).await
    }

    async fn completed_runs_since(
        &self,
        config_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<RunLog>> {
        RunLog::find_completed_since(config_id, since, &self.pool).await
    }

    async fn query_performance(&self, config_id: i64) -> Result<Vec<QueryPerformance>> {
        RunLog::query_performance(config_id, &self.pool).await
    }

    async fn pending_proposal_count(&self, config_id: i64) -> Result<i64> {
        ProposalCounts::pending(config_id, &self.pool).await
    }

    async fn active_proposal_count(&self, config_id: i64) -> Result<i64> {
        ProposalCounts::active(config_id, &self.pool).await
    }

    async fn existing_jobs(&self, tenant_id: i64) -> Result<Vec<KnownJob>> {
        KnownJob::find_job_records(tenant_id, &self.pool).await
    }

    async fn pending_proposals(&self, tenant_id: i64) -> Result<Vec<KnownJob>> {
        KnownJob::find_pending_proposals(tenant_id, &self.pool).await
    }

    async fn user_rejected_urls(&self, tenant_id: i64) -> Result<Vec<String>> {
        KnownJob::find_user_rejected_urls(tenant_id, &self.pool).await
    }

    async fn rejected_job_urls(&self, config_id: i64) -> Result<Vec<String>> {
        RejectedJob::find_urls_by_config(config_id, &self.pool).await
    }

    async fn record_rejected_job(&self, job: NewRejectedJob) -> Result<bool> {
        RejectedJob::insert_if_absent(&job, &self.pool).await
    }

    async fn recent_rejected_jobs(&self, config_id: i64, limit: i64) -> Result<Vec<RejectedJob>> {
        RejectedJob::find_recent(config_id, limit, &self.pool).await
    }
}
