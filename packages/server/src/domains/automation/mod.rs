//! Job-search crawler automation.
//!
//! A crawler config owns a search query, an optional review prompt and a
//! proposal target. Every run searches, filters known postings, optionally
//! validates and reviews candidates, proposes the survivors and then tunes its
//! own query and prompt.

pub mod dedup;
pub mod documents;
pub mod events;
pub mod models;
pub mod query;
pub mod review;
pub mod service;
pub mod settings;
pub mod state;
pub mod store;
pub mod suggestion;
pub mod types;
pub mod validation;

pub use events::AutomationEvent;
pub use models::*;
pub use service::{AutomationService, RunOutcome, RunSummary};
pub use settings::AutomationSettings;
pub use state::{CrawlerState, Transition, TransitionError};
pub use store::{BaseAutomationStore, PgAutomationStore};
pub use types::{DedupSource, JobResult};
