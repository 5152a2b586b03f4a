//! Concurrent liveness checks for candidate URLs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use super::types::JobResult;
use crate::kernel::BaseUrlChecker;

/// Whether a HEAD status means the posting is still up.
///
/// 403, 405 and 429 are treated as alive: plenty of job boards block or
/// throttle HEAD requests from unknown clients.
pub fn is_alive_status(status: u16) -> bool {
    status < 400 || matches!(status, 403 | 405 | 429)
}

/// Checks candidate URLs with bounded concurrency and a per-request timeout.
#[derive(Clone)]
pub struct UrlValidator {
    checker: Arc<dyn BaseUrlChecker>,
    concurrency: usize,
    timeout: Duration,
}

impl UrlValidator {
    pub fn new(checker: Arc<dyn BaseUrlChecker>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            checker,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Return the candidates whose URL answered as alive, in input order.
    ///
    /// Timeouts, transport errors and dead statuses all drop the candidate.
    pub async fn filter_alive(&self, jobs: Vec<JobResult>) -> Vec<JobResult> {
        if jobs.is_empty() {
            return jobs;
        }

        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let alive: Arc<Mutex<Vec<(usize, JobResult)>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::with_capacity(total);

        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let alive = alive.clone();
            let checker = self.checker.clone();
            let timeout = self.timeout;

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                let ok = match tokio::time::timeout(timeout, checker.head_status(&job.url)).await {
                    Ok(Ok(status)) => {
                        let ok = is_alive_status(status);
                        if !ok {
                            debug!(url = %job.url, status, "dropping dead url");
                        }
                        ok
                    }
                    Ok(Err(e)) => {
                        debug!(url = %job.url, error = %e, "url check failed");
                        false
                    }
                    Err(_) => {
                        debug!(url = %job.url, "url check timed out");
                        false
                    }
                };

                if ok {
                    alive.lock().await.push((index, job));
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "url check task panicked");
            }
        }

        let mut alive = std::mem::take(&mut *alive.lock().await);
        alive.sort_by_key(|(index, _)| *index);

        debug!(checked = total, alive = alive.len(), "url validation complete");
        alive.into_iter().map(|(_, job)| job).collect()
    }
}
