// Job-search crawler automation engine
//
// Runs scheduled search crawlers for tenants, turns fresh job postings into
// CRM proposals and tunes each crawler's query and review prompt over time.

pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
