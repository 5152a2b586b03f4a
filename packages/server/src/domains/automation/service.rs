//! Crawler orchestration.
//!
//! `AutomationService` drives one crawler run end to end:
//!
//! ```text
//! claim ─► guard ─► refresh ─► deficit ─┬─► (deficit = 0) pause / disable
//!                                        └─► preload dedup + documents
//!                                              ─► run log ─► search
//!                                              ─► simple path | agent path
//!                                              ─► compiled check ─► suggestions
//!                                              ─► zero-run streak ─► complete log
//!                                              ─► publish ─► reschedule
//! ```
//!
//! Crawler lifecycle changes go through `CrawlerState::apply`; nothing here
//! flips state fields directly.

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dedup::DedupCache;
use super::documents::load_document_context;
use super::events::AutomationEvent;
use super::models::{AutomationConfig, NewRejectedJob, NewRunLog, RunCompletion, RunStatus};
use super::query::{build_search_request, normalize_whitespace};
use super::review::{ReviewEngine, ReviewRequest};
use super::state::{CrawlerState, Transition};
use super::suggestion::{SuggestionContext, SuggestionEngine, SuggestionOutcome};
use super::types::{DedupSource, JobResult};
use super::validation::UrlValidator;
use crate::kernel::{NewProposal, Notification, NotificationKind, SearchResponse, ServerDeps};

/// What a call to [`AutomationService::execute_automation`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The pipeline ran and a run log was written.
    Completed(RunSummary),
    /// The target was already met; the crawler was paused or disabled.
    TargetReached { state: CrawlerState },
    /// Another run for this config is still in flight.
    AlreadyRunning,
    /// The crawler is no longer active.
    Inactive,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: i64,
    pub prospects_found: i32,
    pub proposals_created: i32,
    pub rejected: i32,
    pub compiled: bool,
    pub state: CrawlerState,
    pub next_run_at: Option<DateTime<Utc>>,
    pub suggestions: SuggestionOutcome,
}

/// Counters collected while the search results flow through a run.
#[derive(Debug, Default)]
struct PipelineResult {
    prospects_found: i32,
    proposals_created: i32,
    rejected: i32,
    related_searches: Vec<String>,
    error_message: Option<String>,
}

#[derive(Clone)]
pub struct AutomationService {
    deps: ServerDeps,
    validator: UrlValidator,
    reviewer: ReviewEngine,
    suggestions: SuggestionEngine,
}

impl AutomationService {
    pub fn new(deps: ServerDeps) -> Self {
        let settings = deps.settings.clone();
        let validator = UrlValidator::new(
            deps.url_checker.clone(),
            settings.url_check_concurrency,
            settings.url_check_timeout,
        );
        let reviewer = ReviewEngine::new(deps.llm.clone(), settings.review_timeout);
        let suggestions =
            SuggestionEngine::new(deps.store.clone(), deps.llm.clone(), settings.clone());

        Self {
            deps,
            validator,
            reviewer,
            suggestions,
        }
    }

    pub fn deps(&self) -> &ServerDeps {
        &self.deps
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Claim every due crawler and run each one in turn.
    ///
    /// Returns how many crawlers were claimed. A failing run is logged and
    /// does not stop the others.
    pub async fn process_due_automations(&self) -> Result<usize> {
        let due = self
            .deps
            .store
            .claim_due_configs(Utc::now())
            .await
            .context("Failed to claim due automations")?;

        if due.is_empty() {
            debug!("no automations due");
            return Ok(0);
        }

        info!(count = due.len(), "processing due automations");
        for config in &due {
            match self.execute_automation(config).await {
                Ok(outcome) => debug!(config_id = config.id, ?outcome, "automation finished"),
                Err(e) => error!(config_id = config.id, error = %e, "automation run failed"),
            }
        }
        Ok(due.len())
    }

    /// Claim one crawler's next-run slot and run it in the background.
    pub async fn execute_for_config(&self, config_id: i64) -> Result<JoinHandle<Result<RunOutcome>>> {
        let config = self
            .deps
            .store
            .claim_config(config_id, Utc::now())
            .await?
            .ok_or_else(|| anyhow::anyhow!("automation {} not found or not active", config_id))?;

        let service = self.clone();
        Ok(tokio::spawn(async move {
            let result = service.execute_automation(&config).await;
            if let Err(e) = &result {
                error!(config_id, error = %e, "on-demand automation run failed");
            }
            result
        }))
    }

    /// Re-activate paused crawlers whose pending proposals dropped below target.
    ///
    /// Pending suggestions are switched on as the crawler resumes.
    pub async fn resume_paused_crawlers(&self) -> Result<usize> {
        let paused = self
            .deps
            .store
            .find_paused_configs()
            .await
            .context("Failed to load paused automations")?;

        let mut resumed = 0;
        for config in &paused {
            match self.try_resume(config).await {
                Ok(true) => resumed += 1,
                Ok(false) => {}
                Err(e) => warn!(config_id = config.id, error = %e, "failed to resume crawler"),
            }
        }

        if resumed > 0 {
            info!(resumed, checked = paused.len(), "resumed paused crawlers");
        }
        Ok(resumed)
    }

    /// Re-enable a crawler that was disabled on compilation or for empty runs.
    ///
    /// Clears the empty-run streak so the limit does not trip again on the
    /// first run. Returns `false` if the crawler was not disabled.
    pub async fn enable_config(&self, config_id: i64) -> Result<bool> {
        let store = &self.deps.store;
        let config = store
            .find_config(config_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("automation {} not found", config_id))?;
        if config.state.is_enabled() {
            debug!(config_id, state = ?config.state, "crawler already enabled");
            return Ok(false);
        }

        store
            .set_consecutive_zero_runs(config_id, 0)
            .await
            .context("Failed to reset empty-run streak")?;
        let (state, _) = self
            .transition(config_id, config.state, Transition::Enable, Utc::now())
            .await;
        if state != CrawlerState::Active {
            return Ok(false);
        }

        let refreshed = store.find_config(config_id).await?.unwrap_or(config);
        self.publish_config_updated(&refreshed, state).await;
        Ok(true)
    }

    async fn try_resume(&self, config: &AutomationConfig) -> Result<bool> {
        let store = &self.deps.store;
        if store.has_running_run(config.id).await? {
            debug!(config_id = config.id, "run in flight, not resuming");
            return Ok(false);
        }

        let pending = store.pending_proposal_count(config.id).await?;
        if pending >= i64::from(config.compilation_target) {
            return Ok(false);
        }

        if let Err(e) = store.activate_pending_suggestions(config.id).await {
            warn!(config_id = config.id, error = %e, "failed to activate pending suggestions");
        }

        let (state, _) = self
            .transition(config.id, config.state, Transition::Resume, Utc::now())
            .await;
        if state != CrawlerState::Active {
            return Ok(false);
        }

        let refreshed = store.find_config(config.id).await?.unwrap_or_else(|| config.clone());
        self.publish_config_updated(&refreshed, state).await;
        info!(
            config_id = config.id,
            pending,
            target = config.compilation_target,
            "crawler resumed"
        );
        Ok(true)
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Run the full pipeline for one claimed crawler.
    pub async fn execute_automation(&self, claimed: &AutomationConfig) -> Result<RunOutcome> {
        let config_id = claimed.id;
        let store = &self.deps.store;

        if store.has_running_run(config_id).await? {
            info!(config_id, "run already in progress, skipping");
            return Ok(RunOutcome::AlreadyRunning);
        }

        // Refresh to pick up suggestions and state changes since the claim.
        let Some(cfg) = store.find_config(config_id).await? else {
            warn!(config_id, "automation disappeared before run");
            return Ok(RunOutcome::NotFound);
        };
        if !cfg.state.is_schedulable() {
            debug!(config_id, state = ?cfg.state, "automation not active, skipping");
            return Ok(RunOutcome::Inactive);
        }

        let target = i64::from(cfg.compilation_target);
        let pending = store.pending_proposal_count(config_id).await?;
        let deficit = (target - pending).max(0);
        if deficit == 0 {
            let state = self.handle_target_reached(&cfg, pending).await;
            return Ok(RunOutcome::TargetReached { state });
        }

        let active_before = store.active_proposal_count(config_id).await?;
        let started = Instant::now();

        let (dedup, documents) = tokio::join!(
            DedupCache::load(store.as_ref(), cfg.tenant_id, config_id),
            load_document_context(
                self.deps.documents.as_ref(),
                &cfg.document_ids,
                self.deps.settings.document_char_budget,
            ),
        );

        let query = cfg.active_query().to_string();
        let prompt = cfg.active_prompt().map(str::to_string);
        let (query_changed, prompt_changed) =
            self.detect_changes(config_id, &query, prompt.as_deref()).await;

        let now = Utc::now();
        if let Err(e) = store.mark_run_started(config_id, now).await {
            warn!(config_id, error = %e, "failed to record run start");
        }

        let run = match store
            .create_run_log(NewRunLog {
                config_id,
                executed_query: query.clone(),
                executed_prompt: prompt.clone(),
                query_changed,
                prompt_changed,
            })
            .await
        {
            Ok(run) => run,
            Err(e) => {
                self.reschedule(&cfg).await;
                return Err(e.context("Failed to create run log"));
            }
        };

        info!(
            config_id,
            run_id = run.id,
            deficit,
            query = %query,
            query_changed,
            prompt_changed,
            use_agent = cfg.use_agent,
            "automation run started"
        );
        self.deps
            .stream_hub
            .publish(AutomationEvent::RunStarted {
                config_id,
                run_id: run.id,
                query: query.clone(),
                started_at: run.started_at,
            })
            .await;

        let result = self
            .run_pipeline(&cfg, &query, prompt.as_deref(), deficit, &dedup, documents.as_deref())
            .await;

        let mut state = cfg.state;
        let mut next_run_at = None;

        // Compiled check
        let active_after = match store.active_proposal_count(config_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(config_id, error = %e, "failed to recount proposals");
                active_before + i64::from(result.proposals_created)
            }
        };
        let compiled = active_before < target && active_after >= target;
        if compiled {
            (state, next_run_at) = self.handle_compiled(&cfg, state, active_after).await;
        }

        // Suggestions
        let zero_run_streak = if result.proposals_created == 0 {
            cfg.consecutive_zero_runs.saturating_add(1)
        } else {
            0
        };
        let suggestions = self
            .suggestions
            .evaluate(&SuggestionContext {
                config: &cfg,
                executed_query: &query,
                related_searches: &result.related_searches,
                prospects_found: result.prospects_found,
                proposals_created: result.proposals_created,
                zero_run_streak,
                document_context: documents.as_deref(),
            })
            .await;
        if !suggestions.is_empty() {
            let refreshed = store
                .find_config(config_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| cfg.clone());
            self.publish_config_updated(&refreshed, state).await;
        }

        // Zero-run streak
        if let Err(e) = store
            .set_consecutive_zero_runs(config_id, zero_run_streak)
            .await
        {
            warn!(config_id, error = %e, "failed to update zero-run streak");
        }
        let limit = cfg.empty_run_limit.unwrap_or(0);
        if result.proposals_created == 0 && limit > 0 && zero_run_streak >= limit && state == CrawlerState::Active {
            (state, next_run_at) = self
                .transition(config_id, state, Transition::DisableEmptyRuns, Utc::now())
                .await;
            if state == CrawlerState::AutoDisabled {
                self.notify(
                    &cfg,
                    NotificationKind::AutoDisabled,
                    format!(
                        "Crawler \"{}\" was disabled after {} consecutive runs without new jobs.",
                        cfg.name, zero_run_streak
                    ),
                )
                .await;
            }
        }

        let status = if result.error_message.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Done
        };
        if let Err(e) = store
            .complete_run_log(
                run.id,
                RunCompletion {
                    status,
                    prospects_found: result.prospects_found,
                    proposals_created: result.proposals_created,
                    error_message: result.error_message.clone(),
                },
            )
            .await
        {
            error!(config_id, run_id = run.id, error = %e, "failed to complete run log");
        }

        if state == CrawlerState::Active {
            next_run_at = self.reschedule(&cfg).await;
        }

        self.deps
            .stream_hub
            .publish(AutomationEvent::RunCompleted {
                config_id,
                run_id: run.id,
                prospects_found: result.prospects_found,
                proposals_created: result.proposals_created,
                enabled: state.is_enabled(),
                state,
                next_run_at,
            })
            .await;

        info!(
            config_id,
            run_id = run.id,
            prospects_found = result.prospects_found,
            proposals_created = result.proposals_created,
            rejected = result.rejected,
            compiled,
            zero_run_streak,
            state = ?state,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "automation run completed"
        );

        Ok(RunOutcome::Completed(RunSummary {
            run_id: run.id,
            prospects_found: result.prospects_found,
            proposals_created: result.proposals_created,
            rejected: result.rejected,
            compiled,
            state,
            next_run_at,
            suggestions,
        }))
    }

    /// Search, then turn results into proposals along the simple or agent path.
    async fn run_pipeline(
        &self,
        cfg: &AutomationConfig,
        query: &str,
        prompt: Option<&str>,
        deficit: i64,
        dedup: &DedupCache,
        documents: Option<&str>,
    ) -> PipelineResult {
        let mut result = PipelineResult::default();

        let request = build_search_request(cfg, query, &self.deps.settings);
        let response = match self.deps.search.search(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(config_id = cfg.id, q = %request.q, error = %e, "search failed");
                result.error_message = Some(format!("search failed: {}", e));
                SearchResponse::default()
            }
        };

        let candidates: Vec<JobResult> = response
            .organic
            .into_iter()
            .filter_map(JobResult::from_organic)
            .collect();
        result.related_searches = response.related_searches;
        result.prospects_found = i32::try_from(candidates.len()).unwrap_or(i32::MAX);

        if candidates.is_empty() {
            return result;
        }

        if cfg.use_agent {
            self.agent_path(cfg, query, prompt, deficit, dedup, documents, candidates, &mut result)
                .await;
        } else {
            self.simple_path(cfg, query, deficit, dedup, candidates, &mut result)
                .await;
        }
        result
    }

    /// Results in order, deduplicated, up to the deficit. No review.
    async fn simple_path(
        &self,
        cfg: &AutomationConfig,
        query: &str,
        deficit: i64,
        dedup: &DedupCache,
        candidates: Vec<JobResult>,
        result: &mut PipelineResult,
    ) {
        for job in candidates {
            if i64::from(result.proposals_created) >= deficit {
                break;
            }
            if !dedup.claim(&job) {
                debug!(config_id = cfg.id, url = %job.url, "duplicate candidate skipped");
                continue;
            }
            if self.create_proposal(cfg, &job, None, query).await {
                dedup.mark_url(&job.url, DedupSource::Proposal);
                result.proposals_created += 1;
            }
        }
    }

    /// Dedup, URL validation and LLM review before proposing.
    #[allow(clippy::too_many_arguments)]
    async fn agent_path(
        &self,
        cfg: &AutomationConfig,
        query: &str,
        prompt: Option<&str>,
        deficit: i64,
        dedup: &DedupCache,
        documents: Option<&str>,
        candidates: Vec<JobResult>,
        result: &mut PipelineResult,
    ) {
        let total = candidates.len();
        let fresh: Vec<JobResult> = candidates.into_iter().filter(|job| dedup.claim(job)).collect();
        let fresh_count = fresh.len();

        let alive = self.validator.filter_alive(fresh).await;
        debug!(
            config_id = cfg.id,
            total,
            fresh = fresh_count,
            alive = alive.len(),
            "candidates filtered"
        );
        if alive.is_empty() {
            return;
        }

        let reviewed = self
            .reviewer
            .review(
                alive,
                &ReviewRequest {
                    model: &cfg.agent_model,
                    custom_prompt: prompt,
                    document_context: documents,
                    max_tokens: self.deps.settings.review_max_tokens,
                },
            )
            .await;

        for item in reviewed {
            if item.is_approved() {
                if i64::from(result.proposals_created) >= deficit {
                    continue;
                }
                let reason = Some(item.reason()).filter(|r| !r.is_empty());
                if self.create_proposal(cfg, &item.job, reason, query).await {
                    dedup.mark_url(&item.job.url, DedupSource::Proposal);
                    result.proposals_created += 1;
                }
            } else {
                let recorded = self
                    .deps
                    .store
                    .record_rejected_job(NewRejectedJob {
                        config_id: cfg.id,
                        url: item.job.url.clone(),
                        title: item.job.title.clone(),
                        company: item.job.company.clone(),
                        reason: item.reason().to_string(),
                    })
                    .await;
                match recorded {
                    Ok(_) => {
                        dedup.mark_url(&item.job.url, DedupSource::Rejected);
                        result.rejected += 1;
                    }
                    Err(e) => warn!(config_id = cfg.id, url = %item.job.url, error = %e, "failed to record rejected job"),
                }
            }
        }
    }

    async fn create_proposal(
        &self,
        cfg: &AutomationConfig,
        job: &JobResult,
        review_reason: Option<&str>,
        query: &str,
    ) -> bool {
        let proposal = NewProposal {
            tenant_id: cfg.tenant_id,
            user_id: cfg.user_id,
            entity_type: cfg.entity_type.clone(),
            action: "create".to_string(),
            payload: proposal_payload(job, review_reason, query),
            source: Some(self.deps.settings.proposal_source.clone()),
            automation_config_id: Some(cfg.id),
        };

        match self.deps.proposals.create_proposal(proposal).await {
            Ok(proposal_id) => {
                debug!(config_id = cfg.id, proposal_id, url = %job.url, "proposal created");
                true
            }
            Err(e) => {
                warn!(config_id = cfg.id, url = %job.url, error = %e, "failed to create proposal");
                false
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Deficit is zero: disable when configured to, otherwise pause.
    async fn handle_target_reached(&self, cfg: &AutomationConfig, pending: i64) -> CrawlerState {
        let now = Utc::now();
        let transition = if cfg.disable_on_compiled {
            if cfg.compiled_at.is_none() {
                if let Err(e) = self.deps.store.mark_compiled(cfg.id, now).await {
                    warn!(config_id = cfg.id, error = %e, "failed to mark compiled");
                }
            }
            Transition::DisableCompiled
        } else {
            Transition::Pause
        };

        let (state, _) = self.transition(cfg.id, cfg.state, transition, now).await;
        info!(
            config_id = cfg.id,
            pending,
            target = cfg.compilation_target,
            state = ?state,
            "target reached, no search"
        );
        self.publish_config_updated(cfg, state).await;
        state
    }

    /// The target was crossed during this run.
    async fn handle_compiled(
        &self,
        cfg: &AutomationConfig,
        state: CrawlerState,
        active: i64,
    ) -> (CrawlerState, Option<DateTime<Utc>>) {
        let now = Utc::now();
        if let Err(e) = self.deps.store.mark_compiled(cfg.id, now).await {
            warn!(config_id = cfg.id, error = %e, "failed to mark compiled");
        }
        self.notify(
            cfg,
            NotificationKind::Compiled,
            format!(
                "Crawler \"{}\" reached its target of {} jobs ({} active).",
                cfg.name, cfg.compilation_target, active
            ),
        )
        .await;

        if cfg.disable_on_compiled {
            self.transition(cfg.id, state, Transition::DisableCompiled, now)
                .await
        } else {
            (state, None)
        }
    }

    /// Apply a lifecycle transition and persist the state with its
    /// `next_run_at`. Invalid transitions and failed writes leave the state
    /// unchanged.
    async fn transition(
        &self,
        config_id: i64,
        from: CrawlerState,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> (CrawlerState, Option<DateTime<Utc>>) {
        let next = match from.apply(transition) {
            Ok(next) => next,
            Err(e) => {
                warn!(config_id, error = %e, "ignoring invalid crawler transition");
                return (from, None);
            }
        };

        let next_run_at = next.next_run_on_entry(now);
        if let Err(e) = self.deps.store.set_state(config_id, next, next_run_at).await {
            warn!(config_id, error = %e, ?transition, "failed to persist crawler state");
            return (from, None);
        }

        info!(config_id, from = ?from, to = ?next, ?transition, "crawler state changed");
        (next, next_run_at)
    }

    /// Push `next_run_at` one interval out. Failures are logged only.
    async fn reschedule(&self, cfg: &AutomationConfig) -> Option<DateTime<Utc>> {
        let next = Utc::now() + cfg.interval();
        match self.deps.store.set_next_run(cfg.id, Some(next)).await {
            Ok(()) => Some(next),
            Err(e) => {
                warn!(config_id = cfg.id, error = %e, "failed to reschedule automation");
                None
            }
        }
    }

    /// Compare this run's query and prompt with the last completed run.
    async fn detect_changes(&self, config_id: i64, query: &str, prompt: Option<&str>) -> (bool, bool) {
        match self.deps.store.last_completed_run(config_id).await {
            Ok(Some(last)) => {
                let query_changed = normalize_whitespace(&last.executed_query) != normalize_whitespace(query);
                let prompt_changed = normalize_whitespace(last.executed_prompt.as_deref().unwrap_or_default())
                    != normalize_whitespace(prompt.unwrap_or_default());
                (query_changed, prompt_changed)
            }
            Ok(None) => (false, false),
            Err(e) => {
                warn!(config_id, error = %e, "failed to load last run for change detection");
                (false, false)
            }
        }
    }

    async fn notify(&self, cfg: &AutomationConfig, kind: NotificationKind, message: String) {
        let notification = Notification {
            tenant_id: cfg.tenant_id,
            user_id: cfg.user_id,
            config_id: cfg.id,
            kind,
            message,
        };
        if let Err(e) = self.deps.notifier.notify(notification).await {
            warn!(config_id = cfg.id, ?kind, error = %e, "failed to send notification");
        }
    }

    async fn publish_config_updated(&self, cfg: &AutomationConfig, state: CrawlerState) {
        self.deps
            .stream_hub
            .publish(AutomationEvent::ConfigUpdated {
                config_id: cfg.id,
                enabled: state.is_enabled(),
                state,
                suggested_query: cfg.suggested_query.clone(),
                suggested_prompt: cfg.suggested_prompt.clone(),
            })
            .await;
    }
}

fn proposal_payload(job: &JobResult, review_reason: Option<&str>, query: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("title".into(), json!(job.title));
    payload.insert("company".into(), json!(job.company));
    payload.insert("url".into(), json!(job.url));
    payload.insert("snippet".into(), json!(job.snippet));
    payload.insert("search_query".into(), json!(query));
    if let Some(reason) = review_reason {
        payload.insert("review_reason".into(), json!(reason));
    }
    payload
}
