//! Integration tests for a single crawler run.
//!
//! Drives `AutomationService::execute_automation` end to end with the
//! in-memory store and mock providers:
//! - agent path: validate, review, propose, record rejections
//! - deficit zero: pause or disable without searching
//! - live status events

mod common;

use std::time::Duration;

use automation_core::domains::automation::models::RunStatus;
use automation_core::domains::automation::state::paused_until;
use automation_core::domains::automation::{AutomationEvent, CrawlerState, RunOutcome};
use automation_core::kernel::test_dependencies::{MockLlm, MockSearchService, MockUrlChecker};
use automation_core::kernel::{NotificationKind, TestDependencies};
use chrono::Utc;

use crate::common::*;

// =============================================================================
// Agent path
// =============================================================================

#[tokio::test]
async fn test_agent_run_proposes_approved_and_records_rejected() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(MockLlm::new().with_rule(REVIEW_MARKER, &review_json(5, &[0, 1, 2])));
    let mut config = agent_config(1);
    config.compilation_target = 10;
    config.consecutive_zero_runs = 4;
    deps.store.insert_config(config.clone());
    for i in 1..=3 {
        deps.store
            .add_proposal(1, TENANT_ID, "pending", &format!("https://old.example/{i}"));
    }

    let before = Utc::now();
    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert_eq!(summary.prospects_found, 5);
    assert_eq!(summary.proposals_created, 3);
    assert_eq!(summary.rejected, 2);
    assert!(!summary.compiled);
    assert_eq!(summary.state, CrawlerState::Active);

    // Proposals carry the posting and the reviewer's reason
    let proposals: Vec<_> = deps.store.proposals(1).into_iter().skip(3).collect();
    assert_eq!(proposals.len(), 3);
    assert!(proposals.iter().all(|p| p.status == "pending"));
    assert_eq!(proposals[0].payload["url"], "https://jobs.lever.co/acme/1");
    assert_eq!(proposals[0].payload["company"], "Acme Robotics");
    assert_eq!(proposals[0].payload["review_reason"], "matches the search");
    assert_eq!(proposals[0].payload["search_query"], "rust engineer");

    // Rejections are kept for prompt tuning
    let rejected = deps.store.rejected_jobs(1);
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0].url, "https://careers.deltafreight.example/4");
    assert_eq!(rejected[0].reason, "not a fit");

    // Run log
    let logs = deps.store.run_logs(1);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Done);
    assert_eq!(logs[0].prospects_found, 5);
    assert_eq!(logs[0].proposals_created, 3);
    assert_eq!(logs[0].executed_query, "rust engineer");
    assert!(!logs[0].query_changed);

    // Rescheduled one interval out, streak reset
    let stored = deps.store.config(1).unwrap();
    assert_eq!(stored.consecutive_zero_runs, 0);
    assert!(stored.next_run_at.unwrap() >= before + config.interval());
    assert!(stored.last_run_at.is_some());

    // One review call with the agent model
    let reviews = deps.llm.calls_matching(REVIEW_MARKER);
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].model, config.agent_model);
    assert_eq!(deps.url_checker.call_count(), 5);
}

#[tokio::test]
async fn test_agent_run_all_rejected_counts_as_empty_run() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(MockLlm::new().with_rule(REVIEW_MARKER, &review_json(5, &[])));
    let mut config = agent_config(1);
    config.consecutive_zero_runs = 2;
    deps.store.insert_config(config.clone());

    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert_eq!(summary.proposals_created, 0);
    assert_eq!(summary.rejected, 5);
    assert!(deps.store.proposals(1).is_empty());
    assert_eq!(deps.store.rejected_jobs(1).len(), 5);
    assert_eq!(deps.store.config(1).unwrap().consecutive_zero_runs, 3);
    assert_eq!(deps.store.run_logs(1)[0].status, RunStatus::Done);
}

#[tokio::test]
async fn test_broken_urls_are_dropped_before_review() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(MockLlm::new().with_rule(REVIEW_MARKER, r#"{"reviews":[]}"#))
        .mock_url_checker(
            MockUrlChecker::new()
                .with_status("https://jobs.lever.co/acme/1", 404)
                .with_status("https://boards.greenhouse.io/blueharbor/jobs/2", 403)
                .with_error("https://ember.example/jobs/5"),
        );
    let config = agent_config(1);
    deps.store.insert_config(config.clone());

    deps.service().execute_automation(&config).await.unwrap();

    let review = &deps.llm.calls_matching(REVIEW_MARKER)[0];
    assert!(!review.user_prompt.contains("https://jobs.lever.co/acme/1"));
    assert!(!review.user_prompt.contains("https://ember.example/jobs/5"));
    assert!(review.user_prompt.contains("https://boards.greenhouse.io/blueharbor/jobs/2"));

    // Unmentioned candidates are approved; broken ones are neither proposed nor rejected
    assert_eq!(deps.store.proposals(1).len(), 3);
    assert!(deps.store.rejected_jobs(1).is_empty());
}

#[tokio::test]
async fn test_review_failure_approves_everything() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(MockLlm::new().with_rule(REVIEW_MARKER, "I cannot help with that."));
    let config = agent_config(1);
    deps.store.insert_config(config.clone());

    deps.service().execute_automation(&config).await.unwrap();

    assert_eq!(deps.store.proposals(1).len(), 5);
    assert!(deps.store.rejected_jobs(1).is_empty());
}

#[tokio::test]
async fn test_known_postings_are_not_proposed_again() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(MockLlm::new().with_rule(REVIEW_MARKER, r#"{"reviews":[]}"#));
    let config = agent_config(1);
    deps.store.insert_config(config.clone());

    // Same URL already proposed, same role at the same company already a job,
    // one URL a user rejected, one rejected by this crawler before.
    deps.store.add_proposal(1, TENANT_ID, "approved", "https://unrelated.example/x");
    deps.store.add_proposal(99, TENANT_ID, "pending", "https://jobs.lever.co/acme/1/");
    deps.store.add_job(
        TENANT_ID,
        automation_core::domains::automation::models::KnownJob::new(
            "https://elsewhere.example/blue",
            "Blue Harbor Inc.",
            "Senior Backend Engineer",
        ),
    );
    let user_rejected = deps.store.add_proposal(98, TENANT_ID, "pending", "https://jobs.ashbyhq.com/cobalt/3");
    deps.store.set_proposal_status(user_rejected, "rejected");
    deps.store
        .add_rejected_job(1, "https://careers.deltafreight.example/4", "Platform Engineer", "onsite");

    deps.service().execute_automation(&config).await.unwrap();

    let review = &deps.llm.calls_matching(REVIEW_MARKER)[0];
    assert!(review.user_prompt.contains("https://ember.example/jobs/5"));
    assert!(!review.user_prompt.contains("https://jobs.lever.co/acme/1"));

    let new_urls: Vec<String> = deps
        .store
        .proposals(1)
        .iter()
        .filter(|p| p.status == "pending")
        .filter_map(|p| p.payload["url"].as_str().map(str::to_string))
        .collect();
    assert_eq!(new_urls, vec!["https://ember.example/jobs/5"]);
}

#[tokio::test]
async fn test_proposals_capped_at_deficit() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(MockLlm::new().with_rule(REVIEW_MARKER, r#"{"reviews":[]}"#));
    let mut config = agent_config(1);
    config.compilation_target = 4;
    deps.store.insert_config(config.clone());
    deps.store.add_proposal(1, TENANT_ID, "pending", "https://seeded.example/1");
    deps.store.add_proposal(1, TENANT_ID, "pending", "https://seeded.example/2");

    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert_eq!(summary.proposals_created, 2);
    assert!(summary.compiled);
    assert_eq!(deps.store.proposals(1).len(), 4);

    let sent = deps.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Compiled);
    assert_eq!(sent[0].config_id, 1);
    assert!(deps.store.config(1).unwrap().compiled_at.is_some());
}

#[tokio::test]
async fn test_crossing_target_with_disable_on_compiled_disables() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])));
    let mut config = simple_config(1);
    config.compilation_target = 3;
    config.disable_on_compiled = true;
    deps.store.insert_config(config.clone());

    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert!(summary.compiled);
    assert_eq!(summary.state, CrawlerState::CompiledDisabled);
    let stored = deps.store.config(1).unwrap();
    assert_eq!(stored.state, CrawlerState::CompiledDisabled);
    assert_eq!(stored.next_run_at, None);
}

// =============================================================================
// Deficit zero
// =============================================================================

#[tokio::test]
async fn test_target_reached_pauses_without_searching() {
    let deps = TestDependencies::new();
    let mut config = agent_config(1);
    config.compilation_target = 2;
    deps.store.insert_config(config.clone());
    deps.store.add_proposal(1, TENANT_ID, "pending", "https://a.example/1");
    deps.store.add_proposal(1, TENANT_ID, "pending", "https://a.example/2");

    let outcome = deps.service().execute_automation(&config).await.unwrap();

    assert_eq!(outcome, RunOutcome::TargetReached { state: CrawlerState::Paused });
    assert_eq!(deps.search.call_count(), 0);
    assert!(deps.llm.calls().is_empty());
    assert!(deps.store.run_logs(1).is_empty());

    let stored = deps.store.config(1).unwrap();
    assert_eq!(stored.state, CrawlerState::Paused);
    assert!(stored.is_enabled());
    assert_eq!(stored.next_run_at, Some(paused_until()));
}

#[tokio::test]
async fn test_target_reached_with_disable_on_compiled_disables() {
    let deps = TestDependencies::new();
    let mut config = agent_config(1);
    config.compilation_target = 1;
    config.disable_on_compiled = true;
    deps.store.insert_config(config.clone());
    deps.store.add_proposal(1, TENANT_ID, "pending", "https://a.example/1");

    let outcome = deps.service().execute_automation(&config).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::TargetReached { state: CrawlerState::CompiledDisabled }
    );
    assert_eq!(deps.search.call_count(), 0);
    let stored = deps.store.config(1).unwrap();
    assert_eq!(stored.state, CrawlerState::CompiledDisabled);
    assert!(!stored.is_enabled());
    assert_eq!(stored.next_run_at, None);
    assert!(stored.compiled_at.is_some());
}

#[tokio::test]
async fn test_approved_proposals_do_not_count_toward_deficit() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])));
    let mut config = simple_config(1);
    config.compilation_target = 2;
    deps.store.insert_config(config.clone());
    deps.store.add_proposal(1, TENANT_ID, "approved", "https://a.example/1");
    deps.store.add_proposal(1, TENANT_ID, "approved", "https://a.example/2");

    let outcome = deps.service().execute_automation(&config).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    // Pending is zero, so the full target is searched for again
    assert_eq!(summary.proposals_created, 2);
    // Active count was already at target, so this is not a new compilation
    assert!(!summary.compiled);
}

// =============================================================================
// Live status
// =============================================================================

#[tokio::test]
async fn test_run_publishes_started_and_completed() {
    let deps = TestDependencies::new()
        .mock_search(MockSearchService::new().with_response(search_response(five_postings(), &[])))
        .mock_llm(MockLlm::new().with_rule(REVIEW_MARKER, &review_json(5, &[0])));
    let config = agent_config(1);
    deps.store.insert_config(config.clone());
    let mut rx = deps.stream_hub.subscribe(1).await;

    deps.service().execute_automation(&config).await.unwrap();

    let started = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match started {
        AutomationEvent::RunStarted { config_id, query, .. } => {
            assert_eq!(config_id, 1);
            assert_eq!(query, "rust engineer");
        }
        other => panic!("expected run_started, got {other:?}"),
    }

    let completed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match completed {
        AutomationEvent::RunCompleted {
            prospects_found,
            proposals_created,
            enabled,
            state,
            next_run_at,
            ..
        } => {
            assert_eq!(prospects_found, 5);
            assert_eq!(proposals_created, 1);
            assert!(enabled);
            assert_eq!(state, CrawlerState::Active);
            assert!(next_run_at.is_some());
        }
        other => panic!("expected run_completed, got {other:?}"),
    }
}
