//! Live status events published to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::CrawlerState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationEvent {
    RunStarted {
        config_id: i64,
        run_id: i64,
        query: String,
        started_at: DateTime<Utc>,
    },
    RunCompleted {
        config_id: i64,
        run_id: i64,
        prospects_found: i32,
        proposals_created: i32,
        enabled: bool,
        state: CrawlerState,
        next_run_at: Option<DateTime<Utc>>,
    },
    ConfigUpdated {
        config_id: i64,
        enabled: bool,
        state: CrawlerState,
        suggested_query: Option<String>,
        suggested_prompt: Option<String>,
    },
}

impl AutomationEvent {
    pub fn config_id(&self) -> i64 {
        match self {
            AutomationEvent::RunStarted { config_id, .. }
            | AutomationEvent::RunCompleted { config_id, .. }
            | AutomationEvent::ConfigUpdated { config_id, .. } => *config_id,
        }
    }

    /// SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            AutomationEvent::RunStarted { .. } => "run_started",
            AutomationEvent::RunCompleted { .. } => "run_completed",
            AutomationEvent::ConfigUpdated { .. } => "config_updated",
        }
    }
}
