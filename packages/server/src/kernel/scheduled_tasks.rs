//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Two sweeps drive the automation engine:
//!
//! ```text
//! Scheduler (tick cron, every minute)
//!     │
//!     └─► process_due_automations()
//!             └─► claim due configs → run each
//!
//! Scheduler (resume cron, every five minutes)
//!     │
//!     └─► resume_paused_crawlers()
//!             └─► paused + below target → Active, next_run_at = now
//! ```
//!
//! A failing sweep is logged and retried on the next tick.

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::Config;
use crate::domains::automation::AutomationService;

/// Start all scheduled tasks
pub async fn start_scheduler(service: AutomationService, config: &Config) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let tick_service = service.clone();
    let tick_job = Job::new_async(config.tick_cron.as_str(), move |_uuid, _lock| {
        let service = tick_service.clone();
        Box::pin(async move {
            run_due_sweep(&service).await;
        })
    })?;
    scheduler.add(tick_job).await?;

    let resume_service = service.clone();
    let resume_job = Job::new_async(config.resume_cron.as_str(), move |_uuid, _lock| {
        let service = resume_service.clone();
        Box::pin(async move {
            run_resume_sweep(&service).await;
        })
    })?;
    scheduler.add(resume_job).await?;

    scheduler.start().await?;

    tracing::info!(
        tick_cron = %config.tick_cron,
        resume_cron = %config.resume_cron,
        "Scheduled tasks started"
    );
    Ok(scheduler)
}

/// Run every crawler whose next run is due
async fn run_due_sweep(service: &AutomationService) {
    match service.process_due_automations().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Due-run sweep complete"),
        Err(e) => tracing::error!("Due-run sweep failed: {}", e),
    }
}

/// Re-activate paused crawlers that dropped below target
async fn run_resume_sweep(service: &AutomationService) {
    if let Err(e) = service.resume_paused_crawlers().await {
        tracing::error!("Resume sweep failed: {}", e);
    }
}
