//! Integration tests for query and prompt suggestions produced after runs.

mod common;

use std::time::Duration as StdDuration;

use automation_core::domains::automation::{AutomationEvent, RunOutcome};
use automation_core::kernel::test_dependencies::{MockLlm, MockSearchService};
use automation_core::kernel::TestDependencies;
use chrono::{Duration, Utc};

use crate::common::*;

const NEW_PROMPT: &str = "Approve remote Rust roles, including contract positions.";

#[tokio::test]
async fn test_poor_run_suggests_related_query_and_new_prompt() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(
            five_postings(),
            &["rust engineer", "rust developer jobs"],
        )))
        .mock_llm(
            MockLlm::new()
                .with_rule(REVIEW_MARKER, &review_json(5, &[]))
                .with_rule(PROMPT_MARKER, NEW_PROMPT),
        );
    let mut config = agent_config(1);
    config.suggestion_threshold = Some(20.0);
    deps.store.insert_config(config.clone());
    let mut rx = deps.stream_hub.subscribe(1).await;

    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    // The current query is skipped; the next related search is used without an LLM call
    assert_eq!(summary.suggestions.query.as_deref(), Some("rust developer jobs"));
    assert!(deps.llm.calls_matching(QUERY_MARKER).is_empty());
    assert_eq!(summary.suggestions.prompt.as_deref(), Some(NEW_PROMPT));

    // The rewrite is shown what got rejected
    let rewrite = &deps.llm.calls_matching(PROMPT_MARKER)[0];
    assert!(rewrite.user_prompt.contains("Platform Engineer: not a fit"));
    assert_eq!(rewrite.model, config.analytics_model);

    // Saved but not switched on
    let stored = deps.store.config(1).unwrap();
    assert_eq!(stored.suggested_query.as_deref(), Some("rust developer jobs"));
    assert!(!stored.use_suggested_query);
    assert_eq!(stored.suggested_prompt.as_deref(), Some(NEW_PROMPT));
    assert!(!stored.use_suggested_prompt);
    assert!(stored.prompt_updated_at.is_some());
    assert_eq!(stored.active_query(), "rust engineer");

    // run_started, config_updated, run_completed
    let mut kinds = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout(StdDuration::from_millis(200), rx.recv()).await {
        kinds.push(event.event_type());
        if matches!(event, AutomationEvent::RunCompleted { .. }) {
            break;
        }
    }
    assert_eq!(kinds, vec!["run_started", "config_updated", "run_completed"]);
}

#[tokio::test]
async fn test_llm_query_suggestion_carries_staleness() {
    let deps = TestDependencies::new()
        .mock_llm(MockLlm::new().with_rule(QUERY_MARKER, "\"golang backend engineer\""));
    let mut config = simple_config(1);
    config.consecutive_zero_runs = 5;
    deps.store.insert_config(config.clone());

    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert_eq!(summary.suggestions.query.as_deref(), Some("golang backend engineer"));
    let call = &deps.llm.calls_matching(QUERY_MARKER)[0];
    assert!(call.user_prompt.contains("Current query: rust engineer"));
    assert!(call.user_prompt.contains("HIGH STALENESS"));
    assert_eq!(deps.store.config(1).unwrap().consecutive_zero_runs, 6);
}

#[tokio::test]
async fn test_pending_suggestion_is_not_replaced() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(
            Vec::new(),
            &["rust developer jobs"],
        )))
        .mock_llm(MockLlm::new().with_rule(QUERY_MARKER, "golang engineer"));
    let mut config = simple_config(1);
    config.suggested_query = Some("embedded rust engineer".to_string());
    deps.store.insert_config(config.clone());

    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert!(summary.suggestions.is_empty());
    assert!(deps.llm.calls().is_empty());
    assert_eq!(
        deps.store.config(1).unwrap().suggested_query.as_deref(),
        Some("embedded rust engineer")
    );
}

#[tokio::test]
async fn test_prompt_cooldown_waits_for_enough_runs() {
    let deps = TestDependencies::new()
        .mock_search(
            MockSearchService::new()
                .with_response(search_response(five_postings(), &[]))
                .with_response(search_response(five_postings(), &[])),
        )
        .mock_llm(
            MockLlm::new()
                .with_rule(REVIEW_MARKER, &review_json(5, &[]))
                .with_rule(PROMPT_MARKER, NEW_PROMPT),
        );
    let mut config = agent_config(1);
    config.system_prompt = Some("Only remote roles.".to_string());
    config.suggestion_threshold = Some(20.0);
    config.prompt_cooldown_runs = 3;
    config.prompt_updated_at = Some(Utc::now() - Duration::hours(1));
    deps.store.insert_config(config.clone());
    let service = deps.service();

    // First run since the prompt change: cooldown holds
    service.execute_automation(&config).await.unwrap();
    assert!(deps.llm.calls_matching(PROMPT_MARKER).is_empty());
    assert_eq!(deps.store.rejected_jobs(1).len(), 5);

    // Two more poor runs land; the next run completes the cooldown
    deps.store.add_completed_run(1, "rust engineer", 5, 0);
    deps.store.add_completed_run(1, "rust engineer", 5, 0);
    let outcome = service.execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    let rewrites = deps.llm.calls_matching(PROMPT_MARKER);
    assert_eq!(rewrites.len(), 1);
    assert!(rewrites[0].user_prompt.contains("Only remote roles."));
    assert_eq!(summary.suggestions.prompt.as_deref(), Some(NEW_PROMPT));
}

#[tokio::test]
async fn test_switching_on_suggestion_marks_query_changed() {
    let deps = TestDependencies::new();
    let config = simple_config(1);
    deps.store.insert_config(config.clone());
    let service = deps.service();

    service.execute_automation(&config).await.unwrap();
    deps.store.update_config(1, |c| {
        c.suggested_query = Some("rust developer jobs".to_string());
        c.use_suggested_query = true;
    });
    service.execute_automation(&config).await.unwrap();

    let logs = deps.store.run_logs(1);
    assert_eq!(logs.len(), 2);
    assert!(!logs[0].query_changed);
    assert!(logs[1].query_changed);
    assert_eq!(logs[1].executed_query, "rust developer jobs");
    assert!(!logs[1].prompt_changed);
}

#[tokio::test]
async fn test_accepted_query_survives_the_next_suggestion() {
    let deps = TestDependencies::new().mock_search(
        MockSearchService::new()
            .with_response(search_response(Vec::new(), &["python engineer"]))
            .with_response(search_response(Vec::new(), &["python engineer"])),
    );
    let mut config = simple_config(1);
    config.suggested_query = Some("go engineer".to_string());
    config.use_suggested_query = true;
    deps.store.insert_config(config.clone());
    let service = deps.service();

    service.execute_automation(&config).await.unwrap();

    // The accepted query becomes the base query; the new one waits for a decision
    let stored = deps.store.config(1).unwrap();
    assert_eq!(stored.search_query, "go engineer");
    assert_eq!(stored.suggested_query.as_deref(), Some("python engineer"));
    assert!(!stored.use_suggested_query);
    assert_eq!(stored.active_query(), "go engineer");

    service.execute_automation(&config).await.unwrap();

    let calls = deps.search.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].q.starts_with("go engineer"));
    assert!(calls[1].q.starts_with("go engineer"));
    let logs = deps.store.run_logs(1);
    assert_eq!(logs[1].executed_query, "go engineer");
    assert!(!logs[1].query_changed);
}

#[tokio::test]
async fn test_accepted_prompt_survives_the_next_suggestion() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(
            MockLlm::new()
                .with_rule(REVIEW_MARKER, &review_json(5, &[]))
                .with_rule(PROMPT_MARKER, NEW_PROMPT),
        );
    let mut config = agent_config(1);
    config.system_prompt = Some("Only remote roles.".to_string());
    config.suggested_prompt = Some("Only remote Rust roles.".to_string());
    config.use_suggested_prompt = true;
    config.suggestion_threshold = Some(20.0);
    deps.store.insert_config(config.clone());

    deps.service().execute_automation(&config).await.unwrap();

    let stored = deps.store.config(1).unwrap();
    assert_eq!(stored.suggested_prompt.as_deref(), Some(NEW_PROMPT));
    assert!(!stored.use_suggested_prompt);
    assert_eq!(stored.system_prompt.as_deref(), Some("Only remote Rust roles."));
    assert_eq!(stored.active_prompt(), Some("Only remote Rust roles."));
}
