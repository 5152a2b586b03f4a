//! Server dependencies for the automation engine (using traits for testability)
//!
//! This module provides the central dependency container handed to
//! `AutomationService`. All external services use trait abstractions so tests
//! can swap in `kernel::test_dependencies`.

use std::sync::Arc;

use crate::domains::automation::settings::AutomationSettings;
use crate::domains::automation::store::BaseAutomationStore;
use crate::kernel::{
    stream_hub::StreamHub, BaseDocumentLoader, BaseLlm, BaseNotifier, BaseProposalCreator,
    BaseSearchService, BaseUrlChecker,
};

// =============================================================================
// ServerDeps
// =============================================================================

#[derive(Clone)]
pub struct ServerDeps {
    /// Configs, run logs, rejected jobs and the CRM reads used for dedup
    pub store: Arc<dyn BaseAutomationStore>,
    pub search: Arc<dyn BaseSearchService>,
    /// Routes by model name (`gpt-*` to OpenAI, everything else to Anthropic)
    pub llm: Arc<dyn BaseLlm>,
    pub url_checker: Arc<dyn BaseUrlChecker>,
    pub proposals: Arc<dyn BaseProposalCreator>,
    pub documents: Arc<dyn BaseDocumentLoader>,
    pub notifier: Arc<dyn BaseNotifier>,
    /// In-process pub/sub hub for live status on SSE endpoints
    pub stream_hub: StreamHub,
    pub settings: Arc<AutomationSettings>,
}

impl ServerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn BaseAutomationStore>,
        search: Arc<dyn BaseSearchService>,
        llm: Arc<dyn BaseLlm>,
        url_checker: Arc<dyn BaseUrlChecker>,
        proposals: Arc<dyn BaseProposalCreator>,
        documents: Arc<dyn BaseDocumentLoader>,
        notifier: Arc<dyn BaseNotifier>,
        stream_hub: StreamHub,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            store,
            search,
            llm,
            url_checker,
            proposals,
            documents,
            notifier,
            stream_hub,
            settings: Arc::new(settings),
        }
    }
}
