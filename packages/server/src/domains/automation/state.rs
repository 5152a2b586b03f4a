//! Crawler lifecycle state machine.
//!
//! ```text
//! Active ──Pause──────────────► Paused ──Resume──► Active
//! Active | Paused ──DisableCompiled──► CompiledDisabled
//! Active ──DisableEmptyRuns──► AutoDisabled
//! CompiledDisabled | AutoDisabled ──Enable──► Active
//! ```
//!
//! Only `Active` configs are picked up by the scheduler. `Paused` configs are
//! still enabled and get re-activated by the resume sweep once the pending
//! proposal count drops below target again.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "crawler_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CrawlerState {
    #[default]
    Active,
    /// Target reached without `disable_on_compiled`; waits for the resume sweep.
    Paused,
    /// Target reached with `disable_on_compiled` set.
    CompiledDisabled,
    /// Too many consecutive runs without a proposal.
    AutoDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Pause,
    Resume,
    DisableCompiled,
    DisableEmptyRuns,
    Enable,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid crawler transition {transition:?} from {from:?}")]
pub struct TransitionError {
    pub from: CrawlerState,
    pub transition: Transition,
}

impl CrawlerState {
    /// Apply a named transition, rejecting pairs the lifecycle does not allow.
    pub fn apply(self, transition: Transition) -> Result<CrawlerState, TransitionError> {
        use CrawlerState::*;
        use Transition::*;

        match (self, transition) {
            (Active, Pause) => Ok(Paused),
            (Paused, Resume) => Ok(Active),
            (Active | Paused, DisableCompiled) => Ok(CompiledDisabled),
            (Active, DisableEmptyRuns) => Ok(AutoDisabled),
            (CompiledDisabled | AutoDisabled, Enable) => Ok(Active),
            (from, transition) => Err(TransitionError { from, transition }),
        }
    }

    /// Whether the crawler counts as enabled (a paused crawler still is).
    pub fn is_enabled(self) -> bool {
        matches!(self, CrawlerState::Active | CrawlerState::Paused)
    }

    /// Whether the scheduler may run this crawler.
    pub fn is_schedulable(self) -> bool {
        self == CrawlerState::Active
    }

    /// `next_run_at` value that belongs with this state when entered at `now`.
    pub fn next_run_on_entry(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CrawlerState::Active => Some(now),
            CrawlerState::Paused => Some(paused_until()),
            CrawlerState::CompiledDisabled | CrawlerState::AutoDisabled => None,
        }
    }
}

/// Far-future sentinel used as `next_run_at` while paused.
pub fn paused_until() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
