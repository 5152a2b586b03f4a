// TestDependencies - mock implementations for testing
//
// Provides mock services and an in-memory store that can be injected into
// AutomationService for unit and integration tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    BaseDocumentLoader, BaseLlm, BaseNotifier, BaseProposalCreator, BaseSearchService,
    BaseUrlChecker, DocumentResult, NewProposal, Notification, OrganicResult, SearchRequest,
    SearchResponse, ServerDeps, StreamHub,
};
use crate::domains::automation::models::{
    AutomationConfig, KnownJob, NewRejectedJob, NewRunLog, QueryPerformance, RejectedJob,
    RunCompletion, RunLog, RunStatus,
};
use crate::domains::automation::service::AutomationService;
use crate::domains::automation::settings::AutomationSettings;
use crate::domains::automation::state::CrawlerState;
use crate::domains::automation::store::BaseAutomationStore;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Mock Search Service
// =============================================================================

pub struct MockSearchService {
    responses: Mutex<VecDeque<Result<SearchResponse, String>>>,
    calls: Mutex<Vec<SearchRequest>>,
}

impl MockSearchService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: SearchResponse) -> Self {
        guard(&self.responses).push_back(Ok(response));
        self
    }

    /// Queue a response built from (title, link, snippet) triples
    pub fn with_results(self, results: &[(&str, &str, &str)]) -> Self {
        let organic = results
            .iter()
            .map(|(title, link, snippet)| OrganicResult {
                title: title.to_string(),
                link: link.to_string(),
                snippet: snippet.to_string(),
            })
            .collect();
        self.with_response(SearchResponse {
            organic,
            related_searches: Vec::new(),
        })
    }

    pub fn with_error(self, message: &str) -> Self {
        guard(&self.responses).push_back(Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<SearchRequest> {
        guard(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        guard(&self.calls).len()
    }
}

impl Default for MockSearchService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSearchService for MockSearchService {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        guard(&self.calls).push(request.clone());
        match guard(&self.responses).pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(SearchResponse::default()),
        }
    }
}

// =============================================================================
// Mock LLM
// =============================================================================

/// Arguments captured from a completion call
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
}

/// Rules answer calls whose system prompt contains a marker; anything else
/// is served from the queue, and an empty queue is an error.
pub struct MockLlm {
    rules: Mutex<Vec<(String, Result<String, String>)>>,
    queue: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<LlmCall>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: &str) -> Self {
        guard(&self.queue).push_back(Ok(response.to_string()));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        guard(&self.queue).push_back(Err(message.to_string()));
        self
    }

    /// Answer every call whose system prompt contains `marker`
    pub fn with_rule(self, marker: &str, response: &str) -> Self {
        guard(&self.rules).push((marker.to_string(), Ok(response.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        guard(&self.calls).clone()
    }

    pub fn calls_matching(&self, marker: &str) -> Vec<LlmCall> {
        guard(&self.calls)
            .iter()
            .filter(|c| c.system_prompt.contains(marker))
            .cloned()
            .collect()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseLlm for MockLlm {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        guard(&self.calls).push(LlmCall {
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            max_tokens,
        });

        let ruled = guard(&self.rules)
            .iter()
            .find(|(marker, _)| system_prompt.contains(marker.as_str()))
            .map(|(_, response)| response.clone());

        match ruled.or_else(|| guard(&self.queue).pop_front()) {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("MockLlm: no response configured")),
        }
    }
}

// =============================================================================
// Mock URL Checker
// =============================================================================

pub struct MockUrlChecker {
    statuses: HashMap<String, u16>,
    errors: HashSet<String>,
    default_status: u16,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl MockUrlChecker {
    /// Unknown URLs answer 200.
    pub fn new() -> Self {
        Self {
            statuses: HashMap::new(),
            errors: HashSet::new(),
            default_status: 200,
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn with_error(mut self, url: &str) -> Self {
        self.errors.insert(url.to_string());
        self
    }

    pub fn with_default_status(mut self, status: u16) -> Self {
        self.default_status = status;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of checks observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockUrlChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseUrlChecker for MockUrlChecker {
    async fn head_status(&self, url: &str) -> Result<u16> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.errors.contains(url) {
            anyhow::bail!("connection refused: {}", url);
        }
        Ok(self.statuses.get(url).copied().unwrap_or(self.default_status))
    }
}

// =============================================================================
// Mock Proposal Creator
// =============================================================================

pub struct MockProposalCreator {
    proposals: Mutex<Vec<NewProposal>>,
}

impl MockProposalCreator {
    pub fn new() -> Self {
        Self {
            proposals: Mutex::new(Vec::new()),
        }
    }

    pub fn proposals(&self) -> Vec<NewProposal> {
        guard(&self.proposals).clone()
    }
}

impl Default for MockProposalCreator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseProposalCreator for MockProposalCreator {
    async fn create_proposal(&self, proposal: NewProposal) -> Result<i64> {
        let mut proposals = guard(&self.proposals);
        proposals.push(proposal);
        Ok(proposals.len() as i64)
    }
}

// =============================================================================
// Mock Document Loader
// =============================================================================

pub struct MockDocumentLoader {
    documents: HashMap<i64, DocumentResult>,
    failures: HashSet<i64>,
}

impl MockDocumentLoader {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            failures: HashSet::new(),
        }
    }

    pub fn with_document(mut self, id: i64, document: DocumentResult) -> Self {
        self.documents.insert(id, document);
        self
    }

    pub fn with_failure(mut self, id: i64) -> Self {
        self.failures.insert(id);
        self
    }
}

impl Default for MockDocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseDocumentLoader for MockDocumentLoader {
    async fn get_document_by_id(&self, id: i64) -> Result<Option<DocumentResult>> {
        if self.failures.contains(&id) {
            anyhow::bail!("document store unavailable");
        }
        Ok(self.documents.get(&id).cloned())
    }
}

// =============================================================================
// Mock Notifier
// =============================================================================

pub struct MockNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        guard(&self.sent).clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseNotifier for MockNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        guard(&self.sent).push(notification);
        Ok(())
    }
}

// =============================================================================
// In-memory automation store
// =============================================================================

/// A proposal row as the in-memory CRM sees it
#[derive(Debug, Clone)]
pub struct StoredProposal {
    pub id: i64,
    pub tenant_id: i64,
    pub automation_config_id: Option<i64>,
    pub status: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl StoredProposal {
    fn field(&self, key: &str) -> Option<String> {
        self.payload
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn known_job(&self) -> KnownJob {
        KnownJob {
            url: self.field("url"),
            company: self.field("company"),
            title: self.field("title"),
        }
    }
}

#[derive(Default)]
struct InMemoryState {
    configs: HashMap<i64, AutomationConfig>,
    run_logs: Vec<RunLog>,
    rejected: Vec<RejectedJob>,
    proposals: Vec<StoredProposal>,
    jobs: Vec<(i64, KnownJob)>,
    next_id: i64,
}

impl InMemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn config_mut(&mut self, id: i64) -> Result<&mut AutomationConfig> {
        self.configs
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("automation config {} not found", id))
    }
}

/// `BaseAutomationStore` over plain collections; also acts as the proposal
/// creator so proposal counts reflect what a run created.
#[derive(Default)]
pub struct InMemoryAutomationStore {
    state: Mutex<InMemoryState>,
    fail_run_log_create: Mutex<bool>,
}

impl InMemoryAutomationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_config(&self, config: AutomationConfig) -> i64 {
        let id = config.id;
        let mut state = guard(&self.state);
        state.next_id = state.next_id.max(id);
        state.configs.insert(id, config);
        id
    }

    pub fn config(&self, id: i64) -> Option<AutomationConfig> {
        guard(&self.state).configs.get(&id).cloned()
    }

    pub fn update_config(&self, id: i64, update: impl FnOnce(&mut AutomationConfig)) {
        if let Some(config) = guard(&self.state).configs.get_mut(&id) {
            update(config);
        }
    }

    pub fn run_logs(&self, config_id: i64) -> Vec<RunLog> {
        guard(&self.state)
            .run_logs
            .iter()
            .filter(|r| r.config_id == config_id)
            .cloned()
            .collect()
    }

    pub fn rejected_jobs(&self, config_id: i64) -> Vec<RejectedJob> {
        guard(&self.state)
            .rejected
            .iter()
            .filter(|r| r.config_id == config_id)
            .cloned()
            .collect()
    }

    pub fn proposals(&self, config_id: i64) -> Vec<StoredProposal> {
        guard(&self.state)
            .proposals
            .iter()
            .filter(|p| p.automation_config_id == Some(config_id))
            .cloned()
            .collect()
    }

    /// Seed a proposal with the given status
    pub fn add_proposal(&self, config_id: i64, tenant_id: i64, status: &str, url: &str) -> i64 {
        let mut state = guard(&self.state);
        let id = state.next_id();
        let mut payload = serde_json::Map::new();
        payload.insert("url".into(), serde_json::Value::String(url.to_string()));
        state.proposals.push(StoredProposal {
            id,
            tenant_id,
            automation_config_id: Some(config_id),
            status: status.to_string(),
            payload,
        });
        id
    }

    pub fn set_proposal_status(&self, proposal_id: i64, status: &str) {
        if let Some(p) = guard(&self.state)
            .proposals
            .iter_mut()
            .find(|p| p.id == proposal_id)
        {
            p.status = status.to_string();
        }
    }

    pub fn add_job(&self, tenant_id: i64, job: KnownJob) {
        guard(&self.state).jobs.push((tenant_id, job));
    }

    /// Seed a finished run log
    pub fn add_completed_run(&self, config_id: i64, query: &str, prospects: i32, proposals: i32) {
        let mut state = guard(&self.state);
        let id = state.next_id();
        let now = Utc::now();
        state.run_logs.push(RunLog {
            id,
            config_id,
            status: RunStatus::Done,
            executed_query: query.to_string(),
            executed_prompt: None,
            prompt_chars: 0,
            query_changed: false,
            prompt_changed: false,
            prospects_found: prospects,
            proposals_created: proposals,
            error_message: None,
            started_at: now,
            completed_at: Some(now),
        });
    }

    pub fn add_rejected_job(&self, config_id: i64, url: &str, title: &str, reason: &str) {
        let mut state = guard(&self.state);
        let id = state.next_id();
        state.rejected.push(RejectedJob {
            id,
            config_id,
            url: url.to_string(),
            title: title.to_string(),
            company: String::new(),
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn fail_run_log_create(&self, fail: bool) {
        *guard(&self.fail_run_log_create) = fail;
    }
}

#[async_trait]
impl BaseAutomationStore for InMemoryAutomationStore {
    async fn claim_due_configs(&self, now: DateTime<Utc>) -> Result<Vec<AutomationConfig>> {
        let mut state = guard(&self.state);
        let mut ids: Vec<i64> = state
            .configs
            .values()
            .filter(|c| c.state == CrawlerState::Active && c.next_run_at.is_some_and(|t| t <= now))
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let config = state.config_mut(id)?;
            config.next_run_at = Some(now + config.interval());
            claimed.push(config.clone());
        }
        Ok(claimed)
    }

    async fn claim_config(&self, id: i64, now: DateTime<Utc>) -> Result<Option<AutomationConfig>> {
        let mut state = guard(&self.state);
        match state.configs.get_mut(&id) {
            Some(config) if config.state == CrawlerState::Active => {
                config.next_run_at = Some(now + config.interval());
                Ok(Some(config.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_config(&self, id: i64) -> Result<Option<AutomationConfig>> {
        Ok(guard(&self.state).configs.get(&id).cloned())
    }

    async fn find_paused_configs(&self) -> Result<Vec<AutomationConfig>> {
        let mut paused: Vec<AutomationConfig> = guard(&self.state)
            .configs
            .values()
            .filter(|c| c.state == CrawlerState::Paused)
            .cloned()
            .collect();
        paused.sort_by_key(|c| c.id);
        Ok(paused)
    }

    async fn set_next_run(&self, id: i64, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        guard(&self.state).config_mut(id)?.next_run_at = next_run_at;
        Ok(())
    }

    async fn set_state(
        &self,
        id: i64,
        state: CrawlerState,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = guard(&self.state);
        let config = inner.config_mut(id)?;
        config.state = state;
        config.next_run_at = next_run_at;
        Ok(())
    }

    async fn mark_compiled(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        guard(&self.state).config_mut(id)?.compiled_at = Some(at);
        Ok(())
    }

    async fn mark_run_started(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        guard(&self.state).config_mut(id)?.last_run_at = Some(at);
        Ok(())
    }

    async fn set_consecutive_zero_runs(&self, id: i64, count: i32) -> Result<()> {
        guard(&self.state).config_mut(id)?.consecutive_zero_runs = count;
        Ok(())
    }

    async fn save_query_suggestion(&self, id: i64, query: &str) -> Result<()> {
        let mut state = guard(&self.state);
        let config = state.config_mut(id)?;
        config.search_query = config.active_query().to_string();
        config.suggested_query = Some(query.to_string());
        config.use_suggested_query = false;
        Ok(())
    }

    async fn save_prompt_suggestion(&self, id: i64, prompt: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = guard(&self.state);
        let config = state.config_mut(id)?;
        config.system_prompt = config.active_prompt().map(str::to_string);
        config.suggested_prompt = Some(prompt.to_string());
        config.use_suggested_prompt = false;
        config.prompt_updated_at = Some(at);
        Ok(())
    }

    async fn activate_pending_suggestions(&self, id: i64) -> Result<()> {
        let mut state = guard(&self.state);
        let config = state.config_mut(id)?;
        if config.has_pending_query_suggestion() {
            config.use_suggested_query = true;
        }
        if config.has_pending_prompt_suggestion() {
            config.use_suggested_prompt = true;
        }
        Ok(())
    }

    async fn has_running_run(&self, config_id: i64) -> Result<bool> {
        Ok(guard(&self.state)
            .run_logs
            .iter()
            .any(|r| r.config_id == config_id && r.status == RunStatus::Running))
    }

    async fn create_run_log(&self, new: NewRunLog) -> Result<RunLog> {
        if *guard(&self.fail_run_log_create) {
            anyhow::bail!("run log insert failed");
        }

        let mut state = guard(&self.state);
        if state
            .run_logs
            .iter()
            .any(|r| r.config_id == new.config_id && r.status == RunStatus::Running)
        {
            anyhow::bail!("config {} already has a running run", new.config_id);
        }

        let id = state.next_id();
        let log = RunLog {
            id,
            config_id: new.config_id,
            status: RunStatus::Running,
            prompt_chars: new.prompt_chars(),
            executed_query: new.executed_query,
            executed_prompt: new.executed_prompt,
            query_changed: new.query_changed,
            prompt_changed: new.prompt_changed,
            prospects_found: 0,
            proposals_created: 0,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        state.run_logs.push(log.clone());
        Ok(log)
    }

    async fn complete_run_log(&self, run_id: i64, completion: RunCompletion) -> Result<()> {
        let mut state = guard(&self.state);
        if let Some(log) = state
            .run_logs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == RunStatus::Running)
        {
            log.status = completion.status;
            log.prospects_found = completion.prospects_found;
            log.proposals_created = completion.proposals_created;
            log.error_message = completion.error_message;
            log.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn last_completed_run(&self, config_id: i64) -> Result<Option<RunLog>> {
        Ok(guard(&self.state)
            .run_logs
            .iter()
            .filter(|r| r.config_id == config_id && r.status != RunStatus::Running)
            .max_by_key(|r| (r.started_at, r.id))
            .cloned())
    }

    async fn completed_runs_since(
        &self,
        config_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<RunLog>> {
        Ok(guard(&self.state)
            .run_logs
            .iter()
            .filter(|r| {
                r.config_id == config_id && r.status != RunStatus::Running && r.started_at >= since
            })
            .cloned()
            .collect())
    }

    async fn query_performance(&self, config_id: i64) -> Result<Vec<QueryPerformance>> {
        let state = guard(&self.state);
        let mut by_query: Vec<QueryPerformance> = Vec::new();
        for log in state
            .run_logs
            .iter()
            .filter(|r| r.config_id == config_id && r.status == RunStatus::Done)
        {
            match by_query.iter_mut().find(|p| p.query == log.executed_query) {
                Some(p) => {
                    p.runs += 1;
                    p.prospects += i64::from(log.prospects_found);
                    p.proposals += i64::from(log.proposals_created);
                }
                None => by_query.push(QueryPerformance {
                    query: log.executed_query.clone(),
                    runs: 1,
                    prospects: i64::from(log.prospects_found),
                    proposals: i64::from(log.proposals_created),
                }),
            }
        }
        Ok(by_query)
    }

    async fn pending_proposal_count(&self, config_id: i64) -> Result<i64> {
        Ok(guard(&self.state)
            .proposals
            .iter()
            .filter(|p| p.automation_config_id == Some(config_id) && p.status == "pending")
            .count() as i64)
    }

    async fn active_proposal_count(&self, config_id: i64) -> Result<i64> {
        Ok(guard(&self.state)
            .proposals
            .iter()
            .filter(|p| {
                p.automation_config_id == Some(config_id)
                    && (p.status == "pending" || p.status == "approved")
            })
            .count() as i64)
    }

    async fn existing_jobs(&self, tenant_id: i64) -> Result<Vec<KnownJob>> {
        Ok(guard(&self.state)
            .jobs
            .iter()
            .filter(|(t, _)| *t == tenant_id)
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn pending_proposals(&self, tenant_id: i64) -> Result<Vec<KnownJob>> {
        Ok(guard(&self.state)
            .proposals
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.status == "pending")
            .map(StoredProposal::known_job)
            .collect())
    }

    async fn user_rejected_urls(&self, tenant_id: i64) -> Result<Vec<String>> {
        Ok(guard(&self.state)
            .proposals
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.status == "rejected")
            .filter_map(|p| p.field("url"))
            .collect())
    }

    async fn rejected_job_urls(&self, config_id: i64) -> Result<Vec<String>> {
        Ok(guard(&self.state)
            .rejected
            .iter()
            .filter(|r| r.config_id == config_id)
            .map(|r| r.url.clone())
            .collect())
    }

    async fn record_rejected_job(&self, job: NewRejectedJob) -> Result<bool> {
        let mut state = guard(&self.state);
        if state
            .rejected
            .iter()
            .any(|r| r.config_id == job.config_id && r.url == job.url)
        {
            return Ok(false);
        }
        let id = state.next_id();
        state.rejected.push(RejectedJob {
            id,
            config_id: job.config_id,
            url: job.url,
            title: job.title,
            company: job.company,
            reason: job.reason,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn recent_rejected_jobs(&self, config_id: i64, limit: i64) -> Result<Vec<RejectedJob>> {
        let mut rejected: Vec<RejectedJob> = guard(&self.state)
            .rejected
            .iter()
            .filter(|r| r.config_id == config_id)
            .cloned()
            .collect();
        rejected.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rejected.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rejected)
    }
}

#[async_trait]
impl BaseProposalCreator for InMemoryAutomationStore {
    async fn create_proposal(&self, proposal: NewProposal) -> Result<i64> {
        let mut state = guard(&self.state);
        let id = state.next_id();
        state.proposals.push(StoredProposal {
            id,
            tenant_id: proposal.tenant_id,
            automation_config_id: proposal.automation_config_id,
            status: "pending".to_string(),
            payload: proposal.payload,
        });
        Ok(id)
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Mock services wired together; `service()` builds an `AutomationService`
/// over them. Keep the handles to assert on calls afterwards.
pub struct TestDependencies {
    pub store: Arc<InMemoryAutomationStore>,
    pub search: Arc<MockSearchService>,
    pub llm: Arc<MockLlm>,
    pub url_checker: Arc<MockUrlChecker>,
    pub documents: Arc<MockDocumentLoader>,
    pub notifier: Arc<MockNotifier>,
    pub stream_hub: StreamHub,
    pub settings: AutomationSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryAutomationStore::new()),
            search: Arc::new(MockSearchService::new()),
            llm: Arc::new(MockLlm::new()),
            url_checker: Arc::new(MockUrlChecker::new()),
            documents: Arc::new(MockDocumentLoader::new()),
            notifier: Arc::new(MockNotifier::new()),
            stream_hub: StreamHub::new(),
            settings: AutomationSettings::default(),
        }
    }

    pub fn mock_search(mut self, search: MockSearchService) -> Self {
        self.search = Arc::new(search);
        self
    }

    pub fn mock_llm(mut self, llm: MockLlm) -> Self {
        self.llm = Arc::new(llm);
        self
    }

    pub fn mock_url_checker(mut self, checker: MockUrlChecker) -> Self {
        self.url_checker = Arc::new(checker);
        self
    }

    pub fn mock_documents(mut self, documents: MockDocumentLoader) -> Self {
        self.documents = Arc::new(documents);
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.search.clone(),
            self.llm.clone(),
            self.url_checker.clone(),
            self.store.clone(),
            self.documents.clone(),
            self.notifier.clone(),
            self.stream_hub.clone(),
            self.settings.clone(),
        )
    }

    pub fn service(&self) -> AutomationService {
        AutomationService::new(self.server_deps())
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
