use serde::{Deserialize, Serialize};

use crate::kernel::OrganicResult;

/// Why a candidate is considered already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupSource {
    /// An existing job record.
    Job,
    /// A proposal awaiting a decision.
    Proposal,
    /// A proposal a user rejected.
    UserRejected,
    /// A job the reviewer rejected for this crawler.
    Rejected,
    /// Claimed earlier in the current run.
    Pending,
}

/// A single search hit as the pipeline sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub title: String,
    pub company: String,
    pub url: String,
    pub snippet: String,
}

/// Hosts whose first path segment is the hiring company's slug.
const ATS_SLUG_HOSTS: &[&str] = &[
    "boards.greenhouse.io",
    "job-boards.greenhouse.io",
    "jobs.lever.co",
    "jobs.ashbyhq.com",
    "apply.workable.com",
    "jobs.smartrecruiters.com",
];

impl JobResult {
    /// Build a candidate from an organic hit. Hits without a link are dropped.
    pub fn from_organic(hit: OrganicResult) -> Option<Self> {
        let url = hit.link.trim().to_string();
        if url.is_empty() {
            return None;
        }

        let (title, company) = split_title_company(&hit.title, &url);
        Some(Self {
            title,
            company,
            url,
            snippet: hit.snippet.trim().to_string(),
        })
    }
}

/// Split a result title like "Staff Engineer at Acme" or "Staff Engineer - Acme"
/// into role and company, falling back to the ATS slug in the URL.
fn split_title_company(raw_title: &str, url: &str) -> (String, String) {
    let title = raw_title
        .trim()
        .trim_start_matches("Job Application for ")
        .trim();

    if let Some((role, company)) = title.rsplit_once(" at ") {
        return (role.trim().to_string(), clean_company(company));
    }

    if let Some((role, company)) = title.split_once(" - ") {
        let company = company.split(" - ").next().unwrap_or(company);
        return (role.trim().to_string(), clean_company(company));
    }

    if let Some((role, company)) = title.split_once(" | ") {
        return (role.trim().to_string(), clean_company(company));
    }

    (title.to_string(), company_from_ats_url(url).unwrap_or_default())
}

fn clean_company(company: &str) -> String {
    company
        .trim()
        .trim_end_matches("Careers")
        .trim_end_matches("Jobs")
        .trim()
        .to_string()
}

fn company_from_ats_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !ATS_SLUG_HOSTS.iter().any(|h| host == *h) {
        return None;
    }
    let slug = parsed.path_segments()?.find(|s| !s.is_empty())?;
    Some(slug.replace(['-', '_'], " "))
}
