//! Three-tier duplicate detection for search candidates.
//!
//! Tier 1 is an exact match on the normalized URL against every known source.
//! Tier 2 is a fuzzy company + title match against job records and pending
//! proposals. Tier 3 is the in-run claim set, so two hits pointing at the
//! same posting in one run never both become proposals.
//!
//! The cache sits behind an `RwLock` so validator tasks can read it while the
//! orchestrator claims URLs.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use super::models::KnownJob;
use super::store::BaseAutomationStore;
use super::types::{DedupSource, JobResult};

const LEGAL_SUFFIXES: &[&str] = &["inc", "llc", "corp", "ltd", "co"];
const SENIORITY_PREFIXES: &[&str] = &["senior", "sr", "staff", "lead", "principal", "junior", "jr"];

/// Companies shorter than this are too ambiguous for fuzzy matching.
const MIN_FUZZY_COMPANY_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
struct KnownPosting {
    company: String,
    title: String,
}

#[derive(Debug, Default)]
struct DedupIndex {
    urls: HashMap<String, DedupSource>,
    jobs: Vec<KnownPosting>,
    proposals: Vec<KnownPosting>,
}

/// Per-run dedup cache. Built once per run from the store, then shared.
#[derive(Debug, Default)]
pub struct DedupCache {
    inner: RwLock<DedupIndex>,
}

impl DedupCache {
    /// Load every dedup source for a run in parallel.
    ///
    /// A failing source is logged and treated as empty; dedup degrades rather
    /// than aborting the run.
    pub async fn load(store: &dyn BaseAutomationStore, tenant_id: i64, config_id: i64) -> Self {
        let (jobs, proposals, user_rejected, rejected) = tokio::join!(
            store.existing_jobs(tenant_id),
            store.pending_proposals(tenant_id),
            store.user_rejected_urls(tenant_id),
            store.rejected_job_urls(config_id),
        );

        let jobs = or_empty(jobs, "existing jobs", config_id);
        let proposals = or_empty(proposals, "pending proposals", config_id);
        let user_rejected = or_empty(user_rejected, "user-rejected urls", config_id);
        let rejected = or_empty(rejected, "rejected jobs", config_id);

        Self::from_sources(&jobs, &proposals, &user_rejected, &rejected)
    }

    /// Build from already-fetched sources. Earlier sources win on URL
    /// collisions: jobs, then proposals, then user rejections, then reviewer
    /// rejections.
    pub fn from_sources(
        jobs: &[KnownJob],
        proposals: &[KnownJob],
        user_rejected: &[String],
        rejected: &[String],
    ) -> Self {
        let mut index = DedupIndex::default();

        for url in jobs.iter().filter_map(|j| j.url.as_deref()) {
            insert_url(&mut index.urls, url, DedupSource::Job);
        }
        for url in proposals.iter().filter_map(|p| p.url.as_deref()) {
            insert_url(&mut index.urls, url, DedupSource::Proposal);
        }
        for url in user_rejected {
            insert_url(&mut index.urls, url, DedupSource::UserRejected);
        }
        for url in rejected {
            insert_url(&mut index.urls, url, DedupSource::Rejected);
        }

        index.jobs = jobs.iter().filter_map(KnownPosting::from_known).collect();
        index.proposals = proposals
            .iter()
            .filter_map(KnownPosting::from_known)
            .collect();

        Self {
            inner: RwLock::new(index),
        }
    }

    /// Return the source a candidate duplicates, if any.
    pub fn duplicate_source(&self, job: &JobResult) -> Option<DedupSource> {
        let index = self.read();

        if let Some(key) = normalize_url(&job.url) {
            if let Some(source) = index.urls.get(&key) {
                return Some(*source);
            }
        }

        let company = normalize_company(&job.company);
        let title = normalize_title(&job.title);
        if company.chars().count() < MIN_FUZZY_COMPANY_LEN || title.is_empty() {
            return None;
        }

        if index.jobs.iter().any(|k| k.matches(&company, &title)) {
            return Some(DedupSource::Job);
        }
        if index.proposals.iter().any(|k| k.matches(&company, &title)) {
            return Some(DedupSource::Proposal);
        }
        None
    }

    /// Record (or re-tag) a URL so later lookups in this run see it.
    pub fn mark_url(&self, url: &str, source: DedupSource) {
        if let Some(key) = normalize_url(url) {
            self.write().urls.insert(key, source);
        }
    }

    /// Atomically check a candidate and claim its URL for this run.
    ///
    /// Returns `false` if the candidate duplicates anything, including an
    /// earlier claim in the same run.
    pub fn claim(&self, job: &JobResult) -> bool {
        let Some(key) = normalize_url(&job.url) else {
            return false;
        };

        // Fuzzy check reads the index; take the write lock after so the
        // exact check and insert happen under a single guard.
        if self.duplicate_source(job).is_some() {
            return false;
        }

        let mut index = self.write();
        if index.urls.contains_key(&key) {
            return false;
        }
        index.urls.insert(key, DedupSource::Pending);
        true
    }

    fn read(&self) -> RwLockReadGuard<'_, DedupIndex> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DedupIndex> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KnownPosting {
    fn from_known(known: &KnownJob) -> Option<Self> {
        let company = normalize_company(known.company.as_deref().unwrap_or_default());
        let title = normalize_title(known.title.as_deref().unwrap_or_default());
        if company.chars().count() < MIN_FUZZY_COMPANY_LEN || title.is_empty() {
            return None;
        }
        Some(Self { company, title })
    }

    fn matches(&self, company: &str, title: &str) -> bool {
        let company_match = self.company.contains(company) || company.contains(&self.company);
        let title_match = self.title.contains(title) || title.contains(&self.title);
        company_match && title_match
    }
}

fn or_empty<T>(result: anyhow::Result<Vec<T>>, source: &str, config_id: i64) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(config_id, source, error = %e, "dedup source failed to load, treating as empty");
        Vec::new()
    })
}

fn insert_url(urls: &mut HashMap<String, DedupSource>, url: &str, source: DedupSource) {
    if let Some(key) = normalize_url(url) {
        urls.entry(key).or_insert(source);
    }
}

/// Lowercased URL without fragment or trailing slash. Unparseable input falls
/// back to the trimmed, lowercased string.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let key = match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.split('#').next().unwrap_or(trimmed).to_string(),
    };

    Some(key.trim_end_matches('/').to_lowercase())
}

fn tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase, punctuation-free company name without trailing legal suffixes.
pub fn normalize_company(company: &str) -> String {
    let mut parts = tokens(company);
    while parts.len() > 1 && parts.last().is_some_and(|t| LEGAL_SUFFIXES.contains(&t.as_str())) {
        parts.pop();
    }
    parts.join(" ")
}

/// Lowercase, punctuation-free title without leading seniority words.
pub fn normalize_title(title: &str) -> String {
    let parts = tokens(title);
    parts
        .iter()
        .skip_while(|t| SENIORITY_PREFIXES.contains(&t.as_str()))
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(title: &str, company: &str, url: &str) -> JobResult {
        JobResult {
            title: title.into(),
            company: company.into(),
            url: url.into(),
            snippet: String::new(),
        }
    }

    fn known(url: &str, company: &str, title: &str) -> KnownJob {
        KnownJob::new(url, company, title)
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://Jobs.Lever.co/acme/1/#apply").as_deref(),
            Some("https://jobs.lever.co/acme/1")
        );
        assert_eq!(normalize_url("   "), None);
    }

    #[test]
    fn test_normalize_company_and_title() {
        assert_eq!(normalize_company("Acme, Inc."), "acme");
        assert_eq!(normalize_company("Widget Co"), "widget");
        assert_eq!(normalize_title("Senior Staff Rust Engineer"), "rust engineer");
        assert_eq!(normalize_title("Sr. Backend Developer"), "backend developer");
    }

    #[test]
    fn test_exact_url_match_reports_source_priority() {
        let url = "https://jobs.lever.co/acme/1";
        let cache = DedupCache::from_sources(
            &[],
            &[known(url, "Acme", "Engineer")],
            &[url.to_string()],
            &[url.to_string()],
        );
        assert_eq!(
            cache.duplicate_source(&job("X", "Y", "https://jobs.lever.co/acme/1/")),
            Some(DedupSource::Proposal)
        );
    }

    #[test]
    fn test_fuzzy_match_on_company_and_title() {
        let cache = DedupCache::from_sources(
            &[known("https://a.example/1", "Ferrous Systems GmbH", "Rust Engineer")],
            &[],
            &[],
            &[],
        );
        let dup = job("Senior Rust Engineer", "Ferrous Systems", "https://b.example/2");
        assert_eq!(cache.duplicate_source(&dup), Some(DedupSource::Job));

        let other_role = job("Product Manager", "Ferrous Systems", "https://b.example/3");
        assert_eq!(cache.duplicate_source(&other_role), None);
    }

    #[test]
    fn test_short_company_skips_fuzzy_match() {
        let cache = DedupCache::from_sources(
            &[known("https://a.example/1", "IBM", "Engineer")],
            &[],
            &[],
            &[],
        );
        assert_eq!(cache.duplicate_source(&job("Engineer", "IBM", "https://b.example/2")), None);
    }

    #[test]
    fn test_short_known_company_skips_fuzzy_match() {
        let cache = DedupCache::from_sources(
            &[known("https://go.example/1", "Go", "Engineer")],
            &[known("https://ai.example/1", "AI", "Engineer")],
            &[],
            &[],
        );
        let candidate = job("Engineer", "Google Cloud", "https://careers.google.example/2");
        assert_eq!(cache.duplicate_source(&candidate), None);
        assert!(cache.claim(&candidate));
    }

    #[test]
    fn test_claim_is_exclusive_within_run() {
        let cache = DedupCache::default();
        let first = job("Engineer", "Acme Robotics", "https://acme.example/jobs/1");
        let same_url = job("Other", "Other Co", "https://acme.example/jobs/1#x");

        assert!(cache.claim(&first));
        assert!(!cache.claim(&first));
        assert!(!cache.claim(&same_url));
        assert_eq!(
            cache.duplicate_source(&first),
            Some(DedupSource::Pending)
        );
    }

    #[test]
    fn test_mark_url_retags_claimed_url() {
        let url = "https://acme.example/jobs/1";
        let cache = DedupCache::default();
        let candidate = job("Engineer", "Acme Robotics", url);

        assert_eq!(cache.duplicate_source(&candidate), None);
        assert!(cache.claim(&candidate));
        cache.mark_url(url, DedupSource::Rejected);

        assert_eq!(cache.duplicate_source(&candidate), Some(DedupSource::Rejected));
        assert_eq!(cache.duplicate_source(&candidate), Some(DedupSource::Rejected));
    }
}
