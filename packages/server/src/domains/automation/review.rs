//! LLM relevance review of search candidates.
//!
//! Review fails open: if the provider errors, times out, or returns something
//! unparseable, every candidate comes back as [`Verdict::ParseFailed`], which
//! the orchestrator treats as approved. A bad provider response never blocks a
//! run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use super::types::JobResult;
use crate::kernel::BaseLlm;
use llm_client::strip_code_blocks;

const REVIEW_INSTRUCTIONS: &str = r#"You review job postings found by an automated search on behalf of a job seeker.

For each numbered posting decide whether it is a real, open, relevant job listing worth proposing.
Reject postings that are clearly irrelevant to the search, are aggregator or listing pages rather than a single job, are expired, or do not match the candidate profile when one is provided.

Respond with JSON only, in exactly this shape:
{"reviews":[{"index":0,"approved":true,"reason":"short reason"}]}

Include one entry per posting, using the index shown in brackets."#;

/// Outcome of reviewing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved(String),
    Rejected(String),
    /// The review could not be obtained; treated as approved.
    ParseFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewedJobResult {
    pub job: JobResult,
    pub verdict: Verdict,
}

impl ReviewedJobResult {
    pub fn is_approved(&self) -> bool {
        !matches!(self.verdict, Verdict::Rejected(_))
    }

    pub fn reason(&self) -> &str {
        match &self.verdict {
            Verdict::Approved(reason) | Verdict::Rejected(reason) => reason,
            Verdict::ParseFailed => "",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    reviews: Vec<ReviewEntry>,
}

#[derive(Debug, Deserialize)]
struct ReviewEntry {
    index: i64,
    approved: bool,
    #[serde(default)]
    reason: String,
}

/// Parameters of one review call.
#[derive(Debug, Clone)]
pub struct ReviewRequest<'a> {
    pub model: &'a str,
    pub custom_prompt: Option<&'a str>,
    pub document_context: Option<&'a str>,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct ReviewEngine {
    llm: Arc<dyn BaseLlm>,
    timeout: Duration,
}

impl ReviewEngine {
    pub fn new(llm: Arc<dyn BaseLlm>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Review `jobs`, returning exactly one result per input in input order.
    pub async fn review(&self, jobs: Vec<JobResult>, request: &ReviewRequest<'_>) -> Vec<ReviewedJobResult> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let system_prompt = build_system_prompt(request.custom_prompt);
        let user_prompt = build_user_prompt(&jobs, request.document_context);

        let call = self
            .llm
            .complete(request.model, &system_prompt, &user_prompt, request.max_tokens);

        let verdicts = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => match parse_verdicts(&response, jobs.len()) {
                Some(verdicts) => verdicts,
                None => {
                    warn!(
                        model = request.model,
                        response_len = response.len(),
                        "unparseable review response, approving all candidates"
                    );
                    vec![Verdict::ParseFailed; jobs.len()]
                }
            },
            Ok(Err(e)) => {
                warn!(model = request.model, error = %e, "review call failed, approving all candidates");
                vec![Verdict::ParseFailed; jobs.len()]
            }
            Err(_) => {
                warn!(
                    model = request.model,
                    timeout_secs = self.timeout.as_secs(),
                    "review call timed out, approving all candidates"
                );
                vec![Verdict::ParseFailed; jobs.len()]
            }
        };

        let results: Vec<ReviewedJobResult> = jobs
            .into_iter()
            .zip(verdicts)
            .map(|(job, verdict)| ReviewedJobResult { job, verdict })
            .collect();

        info!(
            model = request.model,
            reviewed = results.len(),
            approved = results.iter().filter(|r| r.is_approved()).count(),
            "review complete"
        );
        results
    }
}

pub fn build_system_prompt(custom_prompt: Option<&str>) -> String {
    match custom_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(custom) => format!("{REVIEW_INSTRUCTIONS}\n\nAdditional instructions:\n{custom}"),
        None => REVIEW_INSTRUCTIONS.to_string(),
    }
}

pub fn build_user_prompt(jobs: &[JobResult], document_context: Option<&str>) -> String {
    let mut prompt = String::from("Postings to review:\n");
    for (index, job) in jobs.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{index}]\nTitle: {}\nCompany: {}\nURL: {}\nSnippet: {}\n",
            job.title, job.company, job.url, job.snippet
        ));
    }

    if let Some(context) = document_context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\nCandidate documents:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt
}

/// Parse a review response into one verdict per candidate.
///
/// Out-of-range indices are ignored, the first entry for an index wins, and
/// unmentioned candidates are approved with an empty reason. Returns `None`
/// when no JSON object can be parsed.
pub fn parse_verdicts(response: &str, count: usize) -> Option<Vec<Verdict>> {
    let parsed: ReviewResponse = serde_json::from_str(json_object_span(response)?).ok()?;

    let mut by_index: HashMap<usize, Verdict> = HashMap::new();
    for entry in parsed.reviews {
        let Ok(index) = usize::try_from(entry.index) else {
            continue;
        };
        if index >= count {
            continue;
        }
        let reason = entry.reason.trim().to_string();
        by_index.entry(index).or_insert(if entry.approved {
            Verdict::Approved(reason)
        } else {
            Verdict::Rejected(reason)
        });
    }

    Some(
        (0..count)
            .map(|i| by_index.remove(&i).unwrap_or(Verdict::Approved(String::new())))
            .collect(),
    )
}

/// Text between the first `{` and the last `}`, after stripping code fences.
fn json_object_span(response: &str) -> Option<&str> {
    let text = strip_code_blocks(response);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockLlm;

    fn jobs(n: usize) -> Vec<JobResult> {
        (0..n)
            .map(|i| JobResult {
                title: format!("Engineer {i}"),
                company: "Acme".into(),
                url: format!("https://acme.example/{i}"),
                snippet: String::new(),
            })
            .collect()
    }

    fn request() -> ReviewRequest<'static> {
        ReviewRequest {
            model: "gpt-4o-mini",
            custom_prompt: Some("Only remote roles."),
            document_context: Some("--- cv.txt ---\nRust"),
            max_tokens: 4096,
        }
    }

    #[test]
    fn test_parse_verdicts_fenced_and_partial() {
        let response = "Here you go:\n```json\n{\"reviews\":[{\"index\":0,\"approved\":false,\"reason\":\"onsite\"},{\"index\":7,\"approved\":false,\"reason\":\"x\"}]}\n```";
        let verdicts = parse_verdicts(response, 3).unwrap();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Rejected("onsite".into()),
                Verdict::Approved(String::new()),
                Verdict::Approved(String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_verdicts_first_entry_wins() {
        let response = r#"{"reviews":[{"index":1,"approved":true,"reason":"good"},{"index":1,"approved":false,"reason":"bad"},{"index":-1,"approved":false}]}"#;
        let verdicts = parse_verdicts(response, 2).unwrap();
        assert_eq!(verdicts[1], Verdict::Approved("good".into()));
    }

    #[test]
    fn test_parse_verdicts_rejects_garbage() {
        assert_eq!(parse_verdicts("no json here", 2), None);
        assert_eq!(parse_verdicts("{ not json }", 2), None);
    }

    #[test]
    fn test_prompts_include_custom_addendum_and_documents() {
        let system = build_system_prompt(Some("  Only remote roles. "));
        assert!(system.starts_with(REVIEW_INSTRUCTIONS));
        assert!(system.ends_with("Only remote roles."));
        assert_eq!(build_system_prompt(Some("  ")), REVIEW_INSTRUCTIONS);

        let user = build_user_prompt(&jobs(2), Some("--- cv.txt ---\nRust"));
        assert!(user.contains("[0]\nTitle: Engineer 0"));
        assert!(user.contains("[1]\nTitle: Engineer 1"));
        assert!(user.contains("Candidate documents:\n--- cv.txt ---\nRust"));
    }

    #[tokio::test]
    async fn test_malformed_response_approves_all() {
        let llm = Arc::new(MockLlm::new().with_response("definitely not json"));
        let engine = ReviewEngine::new(llm, Duration::from_secs(60));

        let results = engine.review(jobs(4), &request()).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.is_approved() && r.reason().is_empty()));
        assert!(results.iter().all(|r| r.verdict == Verdict::ParseFailed));
    }

    #[tokio::test]
    async fn test_provider_error_approves_all() {
        let llm = Arc::new(MockLlm::new().with_error("503 upstream"));
        let engine = ReviewEngine::new(llm, Duration::from_secs(60));

        let results = engine.review(jobs(3), &request()).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(ReviewedJobResult::is_approved));
    }

    #[tokio::test]
    async fn test_review_applies_verdicts_and_uses_model() {
        let llm = Arc::new(MockLlm::new().with_response(
            r#"{"reviews":[{"index":0,"approved":true,"reason":"fit"},{"index":1,"approved":false,"reason":"senior only"}]}"#,
        ));
        let engine = ReviewEngine::new(llm.clone(), Duration::from_secs(60));

        let results = engine.review(jobs(2), &request()).await;
        assert_eq!(results[0].verdict, Verdict::Approved("fit".into()));
        assert!(!results[1].is_approved());
        assert_eq!(results[1].reason(), "senior only");

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gpt-4o-mini");
        assert!(calls[0].system_prompt.contains("Only remote roles."));
    }

    #[tokio::test]
    async fn test_empty_input_skips_llm() {
        let llm = Arc::new(MockLlm::new());
        let engine = ReviewEngine::new(llm.clone(), Duration::from_secs(60));
        assert!(engine.review(Vec::new(), &request()).await.is_empty());
        assert!(llm.calls().is_empty());
    }
}
