//! Self-tuning of search queries and review prompts.
//!
//! Two independent axes are evaluated after every run. A produced suggestion
//! is saved but not switched on; a human (or the resume sweep) flips the
//! matching `use_suggested_*` flag.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::models::{AutomationConfig, QueryPerformance, RejectedJob, RunLog};
use super::query::{comparison_key, normalize_whitespace, sanitize_suggested_query};
use super::settings::AutomationSettings;
use super::store::BaseAutomationStore;
use crate::kernel::BaseLlm;
use llm_client::strip_code_blocks;

const QUERY_INSTRUCTIONS: &str = "You write web search queries that find individual job postings. \
Reply with a single search query on one line and nothing else. \
Do not include a location, quotes around the whole query, or search operators.";

const PROMPT_INSTRUCTIONS: &str = "You improve the instructions given to an automated reviewer that \
approves or rejects job postings for a job seeker. \
Rewrite the instructions so that good postings stop being rejected for the reasons shown. \
Reply with the new instructions only.";

/// Analytics lists at most this many best and worst queries.
const ANALYTICS_QUERY_LIMIT: usize = 3;

/// Directive pushing the LLM toward larger query changes as empty runs pile up.
pub fn staleness_directive(consecutive_zero_runs: i32) -> Option<&'static str> {
    match consecutive_zero_runs {
        n if n >= 10 => Some(
            "CRITICAL STALENESS: the last 10+ runs found nothing new. Completely pivot to a different angle on the role.",
        ),
        n if n >= 6 => Some(
            "HIGH STALENESS: recent runs keep finding nothing new. Make a drastic change to the query.",
        ),
        n if n >= 3 => Some(
            "STALENESS WARNING: several runs found nothing new. Try different keywords.",
        ),
        _ => None,
    }
}

/// Proposals per prospect as a percentage.
pub fn conversion_rate(prospects: i32, proposals: i32) -> f64 {
    if prospects <= 0 {
        return 0.0;
    }
    f64::from(proposals) / f64::from(prospects) * 100.0
}

/// Whether a run's numbers fall below the configured quality thresholds.
pub fn needs_prompt_suggestion(cfg: &AutomationConfig, prospects: i32, proposals: i32) -> bool {
    let rate_low = cfg
        .suggestion_threshold
        .filter(|t| *t > 0.0)
        .is_some_and(|t| conversion_rate(prospects, proposals) < t);
    let prospects_low = cfg
        .min_prospects_threshold
        .filter(|m| *m > 0)
        .is_some_and(|m| prospects < m);
    rate_low || prospects_low
}

/// Whether a new prompt suggestion must wait.
///
/// `history` holds the runs completed since the last prompt update; the
/// current run counts toward the cooldown too. The cooldown holds if any run
/// since the update already met the thresholds, or if too few runs or
/// prospects have accumulated.
pub fn prompt_cooldown_active(cfg: &AutomationConfig, history: &[RunLog], current_prospects: i32) -> bool {
    if cfg.prompt_updated_at.is_none() {
        return false;
    }

    if history
        .iter()
        .any(|run| !needs_prompt_suggestion(cfg, run.prospects_found, run.proposals_created))
    {
        return true;
    }

    let runs = history.len() as i64 + 1;
    if runs < i64::from(cfg.prompt_cooldown_runs) {
        return true;
    }

    let prospects: i64 = history
        .iter()
        .map(|run| i64::from(run.prospects_found))
        .sum::<i64>()
        + i64::from(current_prospects);
    prospects < i64::from(cfg.prompt_cooldown_prospects)
}

/// First related search that survives sanitizing and has not been tried.
pub fn pick_related_search(
    related: &[String],
    cfg: &AutomationConfig,
    tried: &HashSet<String>,
    current: &str,
) -> Option<String> {
    let current = comparison_key(current);
    related
        .iter()
        .map(|r| sanitize_suggested_query(r, cfg))
        .find(|candidate| {
            let key = comparison_key(candidate);
            !key.is_empty() && key != current && !tried.contains(&key)
        })
}

/// Everything the engine needs to know about the run that just happened.
#[derive(Debug, Clone)]
pub struct SuggestionContext<'a> {
    pub config: &'a AutomationConfig,
    pub executed_query: &'a str,
    pub related_searches: &'a [String],
    pub prospects_found: i32,
    pub proposals_created: i32,
    /// Zero-proposal streak including this run.
    pub zero_run_streak: i32,
    pub document_context: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionOutcome {
    pub query: Option<String>,
    pub prompt: Option<String>,
}

impl SuggestionOutcome {
    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.prompt.is_none()
    }
}

#[derive(Clone)]
pub struct SuggestionEngine {
    store: Arc<dyn BaseAutomationStore>,
    llm: Arc<dyn BaseLlm>,
    settings: Arc<AutomationSettings>,
}

impl SuggestionEngine {
    pub fn new(
        store: Arc<dyn BaseAutomationStore>,
        llm: Arc<dyn BaseLlm>,
        settings: Arc<AutomationSettings>,
    ) -> Self {
        Self {
            store,
            llm,
            settings,
        }
    }

    /// Evaluate both axes and persist whatever was produced.
    pub async fn evaluate(&self, ctx: &SuggestionContext<'_>) -> SuggestionOutcome {
        let config_id = ctx.config.id;
        let mut outcome = SuggestionOutcome::default();

        if let Some(query) = self.suggest_query(ctx).await {
            match self.store.save_query_suggestion(config_id, &query).await {
                Ok(()) => {
                    info!(config_id, suggested_query = %query, "saved query suggestion");
                    outcome.query = Some(query);
                }
                Err(e) => warn!(config_id, error = %e, "failed to save query suggestion"),
            }
        }

        if let Some(prompt) = self.suggest_prompt(ctx).await {
            match self
                .store
                .save_prompt_suggestion(config_id, &prompt, Utc::now())
                .await
            {
                Ok(()) => {
                    info!(config_id, prompt_chars = prompt.chars().count(), "saved prompt suggestion");
                    outcome.prompt = Some(prompt);
                }
                Err(e) => warn!(config_id, error = %e, "failed to save prompt suggestion"),
            }
        }

        outcome
    }

    /// Produce a replacement query, preferring an unused related search.
    pub async fn suggest_query(&self, ctx: &SuggestionContext<'_>) -> Option<String> {
        let cfg = ctx.config;
        if cfg.has_pending_query_suggestion() {
            debug!(config_id = cfg.id, "query suggestion pending review, skipping");
            return None;
        }

        let performance = self.store.query_performance(cfg.id).await.unwrap_or_else(|e| {
            warn!(config_id = cfg.id, error = %e, "failed to load query analytics");
            Vec::new()
        });
        let tried: HashSet<String> = performance
            .iter()
            .map(|p| comparison_key(&p.query))
            .chain(std::iter::once(comparison_key(ctx.executed_query)))
            .collect();

        if let Some(related) = pick_related_search(ctx.related_searches, cfg, &tried, ctx.executed_query) {
            debug!(config_id = cfg.id, query = %related, "using related search as suggestion");
            return Some(related);
        }

        let user_prompt = build_query_prompt(ctx, &performance, &tried);
        let response = self.complete(&cfg.analytics_model, QUERY_INSTRUCTIONS, &user_prompt, cfg.id).await?;

        let line = strip_code_blocks(&response)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())?
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .to_string();
        let suggestion = sanitize_suggested_query(&line, cfg);

        if suggestion.is_empty() || comparison_key(&suggestion) == comparison_key(ctx.executed_query) {
            debug!(config_id = cfg.id, "llm query suggestion empty or unchanged");
            return None;
        }
        Some(suggestion)
    }

    /// Produce a replacement review prompt when quality is low and the
    /// cooldown since the last prompt change has elapsed.
    pub async fn suggest_prompt(&self, ctx: &SuggestionContext<'_>) -> Option<String> {
        let cfg = ctx.config;
        if cfg.has_pending_prompt_suggestion() {
            debug!(config_id = cfg.id, "prompt suggestion pending review, skipping");
            return None;
        }

        if !needs_prompt_suggestion(cfg, ctx.prospects_found, ctx.proposals_created) {
            return None;
        }

        if let Some(updated_at) = cfg.prompt_updated_at {
            let history = match self.store.completed_runs_since(cfg.id, updated_at).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(config_id = cfg.id, error = %e, "failed to load run history, skipping prompt suggestion");
                    return None;
                }
            };
            if prompt_cooldown_active(cfg, &history, ctx.prospects_found) {
                debug!(config_id = cfg.id, runs_since_update = history.len(), "prompt cooldown active");
                return None;
            }
        }

        let rejected = self
            .store
            .recent_rejected_jobs(cfg.id, self.settings.rejected_sample_size)
            .await
            .unwrap_or_else(|e| {
                warn!(config_id = cfg.id, error = %e, "failed to load rejected jobs");
                Vec::new()
            });
        if rejected.is_empty() {
            debug!(config_id = cfg.id, "no rejected jobs to learn from");
            return None;
        }

        let user_prompt = build_prompt_rewrite_prompt(cfg.active_prompt(), &rejected);
        let response = self.complete(&cfg.analytics_model, PROMPT_INSTRUCTIONS, &user_prompt, cfg.id).await?;

        let prompt = strip_code_blocks(&response).trim().to_string();
        let unchanged = cfg
            .active_prompt()
            .is_some_and(|current| normalize_whitespace(current) == normalize_whitespace(&prompt));
        if prompt.is_empty() || unchanged {
            return None;
        }
        Some(prompt)
    }

    async fn complete(&self, model: &str, system: &str, user: &str, config_id: i64) -> Option<String> {
        let call = self
            .llm
            .complete(model, system, user, self.settings.suggestion_max_tokens);
        match tokio::time::timeout(self.settings.suggestion_timeout, call).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(e)) => {
                warn!(config_id, model, error = %e, "suggestion call failed");
                None
            }
            Err(_) => {
                warn!(config_id, model, "suggestion call timed out");
                None
            }
        }
    }
}

fn build_query_prompt(
    ctx: &SuggestionContext<'_>,
    performance: &[QueryPerformance],
    tried: &HashSet<String>,
) -> String {
    let cfg = ctx.config;
    let mut prompt = format!("Current query: {}\n", ctx.executed_query);

    if cfg.use_analytics && !performance.is_empty() {
        let mut ranked: Vec<&QueryPerformance> = performance.iter().filter(|p| p.runs > 0).collect();
        ranked.sort_by(|a, b| b.conversion_rate().total_cmp(&a.conversion_rate()));

        prompt.push_str("\nBest performing queries:\n");
        for p in ranked.iter().take(ANALYTICS_QUERY_LIMIT) {
            prompt.push_str(&format_performance(p));
        }
        prompt.push_str("\nWorst performing queries:\n");
        for p in ranked.iter().rev().take(ANALYTICS_QUERY_LIMIT) {
            prompt.push_str(&format_performance(p));
        }

        let untried: Vec<&String> = ctx
            .related_searches
            .iter()
            .filter(|r| !tried.contains(&comparison_key(r)))
            .collect();
        if !untried.is_empty() {
            prompt.push_str("\nRelated searches not yet tried:\n");
            for r in untried {
                prompt.push_str(&format!("- {r}\n"));
            }
        }
    }

    if let Some(review_prompt) = cfg.active_prompt() {
        prompt.push_str(&format!("\nWhat the job seeker is looking for:\n{review_prompt}\n"));
    }
    if let Some(documents) = ctx.document_context {
        prompt.push_str(&format!("\nCandidate documents:\n{documents}\n"));
    }
    if let Some(directive) = staleness_directive(ctx.zero_run_streak) {
        prompt.push_str(&format!("\n{directive}\n"));
    }
    prompt
}

fn format_performance(p: &QueryPerformance) -> String {
    format!(
        "- \"{}\": {} runs, {} prospects, {} proposals ({:.1}% conversion)\n",
        p.query,
        p.runs,
        p.prospects,
        p.proposals,
        p.conversion_rate()
    )
}

fn build_prompt_rewrite_prompt(current: Option<&str>, rejected: &[RejectedJob]) -> String {
    let mut prompt = format!(
        "Current reviewer instructions:\n{}\n\nRecently rejected postings:\n",
        current.unwrap_or("(none)")
    );
    for job in rejected {
        prompt.push_str(&format!("- {}: {}\n", job.title, job.reason));
    }
    prompt
}
