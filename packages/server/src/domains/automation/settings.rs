use std::time::Duration;

/// Static tuning for the automation engine, built once at startup and
/// injected into the service.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub review_timeout: Duration,
    pub suggestion_timeout: Duration,
    pub url_check_timeout: Duration,
    pub url_check_concurrency: usize,
    /// Combined character budget for document context across all documents.
    pub document_char_budget: usize,
    pub review_max_tokens: u32,
    pub suggestion_max_tokens: u32,
    /// Rejected jobs shown to the LLM when rewriting the review prompt.
    pub rejected_sample_size: i64,
    /// Default search country (`gl`) when a config does not set one.
    pub default_country: String,
    /// Job boards targeted in ATS mode.
    pub ats_sites: Vec<String>,
    /// Aggregators excluded from generic searches.
    pub excluded_sites: Vec<String>,
    /// Source tag written on created proposals.
    pub proposal_source: String,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            review_timeout: Duration::from_secs(60),
            suggestion_timeout: Duration::from_secs(30),
            url_check_timeout: Duration::from_secs(5),
            url_check_concurrency: 5,
            document_char_budget: 15_000,
            review_max_tokens: 4096,
            suggestion_max_tokens: 1024,
            rejected_sample_size: 10,
            default_country: "us".to_string(),
            ats_sites: [
                "boards.greenhouse.io",
                "job-boards.greenhouse.io",
                "jobs.lever.co",
                "jobs.ashbyhq.com",
                "apply.workable.com",
                "jobs.smartrecruiters.com",
                "myworkdayjobs.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            excluded_sites: [
                "linkedin.com",
                "indeed.com",
                "glassdoor.com",
                "ziprecruiter.com",
                "monster.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            proposal_source: "automation".to_string(),
        }
    }
}
