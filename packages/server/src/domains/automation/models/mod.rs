pub mod automation_config;
pub mod known_job;
pub mod rejected_job;
pub mod run_log;

pub use automation_config::*;
pub use known_job::*;
pub use rejected_job::*;
pub use run_log::*;
