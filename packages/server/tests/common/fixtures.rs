//! Test fixtures for building crawler configs and canned provider answers.
//!
//! Everything runs against `InMemoryAutomationStore`; no database needed.

#![allow(dead_code)]

use automation_core::domains::automation::models::AutomationConfig;
use automation_core::kernel::{OrganicResult, SearchResponse};
use chrono::{Duration, Utc};

pub const TENANT_ID: i64 = 7;
pub const USER_ID: i64 = 70;

/// Marker found in the review system prompt
pub const REVIEW_MARKER: &str = "You review job postings";
/// Marker found in the query suggestion system prompt
pub const QUERY_MARKER: &str = "You write web search queries";
/// Marker found in the prompt rewrite system prompt
pub const PROMPT_MARKER: &str = "You improve the instructions";

/// Active crawler that is due now, with the review agent switched on
pub fn agent_config(id: i64) -> AutomationConfig {
    AutomationConfig::builder()
        .id(id)
        .tenant_id(TENANT_ID)
        .user_id(USER_ID)
        .name(format!("Crawler {id}"))
        .search_query("rust engineer")
        .compilation_target(5)
        .use_agent(true)
        .next_run_at(Some(Utc::now() - Duration::minutes(1)))
        .build()
}

/// Active crawler without review or URL validation
pub fn simple_config(id: i64) -> AutomationConfig {
    let mut config = agent_config(id);
    config.use_agent = false;
    config
}

/// Organic hit with "Role at Company" title
pub fn hit(role: &str, company: &str, link: &str) -> OrganicResult {
    OrganicResult {
        title: format!("{role} at {company}"),
        link: link.to_string(),
        snippet: format!("{company} is hiring a {role}."),
    }
}

/// Five distinct postings at five companies
pub fn five_postings() -> Vec<OrganicResult> {
    vec![
        hit("Rust Engineer", "Acme Robotics", "https://jobs.lever.co/acme/1"),
        hit("Backend Engineer", "Blue Harbor", "https://boards.greenhouse.io/blueharbor/jobs/2"),
        hit("Systems Engineer", "Cobalt Labs", "https://jobs.ashbyhq.com/cobalt/3"),
        hit("Platform Engineer", "Delta Freight", "https://careers.deltafreight.example/4"),
        hit("Infrastructure Engineer", "Ember Health", "https://ember.example/jobs/5"),
    ]
}

pub fn search_response(organic: Vec<OrganicResult>, related: &[&str]) -> SearchResponse {
    SearchResponse {
        organic,
        related_searches: related.iter().map(|r| r.to_string()).collect(),
    }
}

/// Review JSON approving the given 0-based indices and rejecting the rest
pub fn review_json(count: usize, approved: &[usize]) -> String {
    let reviews: Vec<serde_json::Value> = (0..count)
        .map(|index| {
            let ok = approved.contains(&index);
            serde_json::json!({
                "index": index,
                "approved": ok,
                "reason": if ok { "matches the search" } else { "not a fit" },
            })
        })
        .collect();
    serde_json::json!({ "reviews": reviews }).to_string()
}
