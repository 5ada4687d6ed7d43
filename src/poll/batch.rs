//! Bounded concurrent polling over independent jobs.
//!
//! Polls share no mutable state and address independent remote job ids, so
//! they need no coordination; the semaphore only caps simultaneous
//! outbound requests. Pool size is caller configuration, not a correctness
//! requirement.

use crate::models::{FlowgateError, JobSnapshot, Result};
use crate::poll::{poll_job, PollSettings};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Polls a batch of jobs concurrently, at most `max_concurrent` at a time.
pub struct BatchPoller {
    semaphore: Arc<Semaphore>,
    settings: PollSettings,
}

impl BatchPoller {
    pub fn new(max_concurrent: usize, settings: PollSettings) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            settings,
        }
    }

    /// Poll every job to its own outcome.
    ///
    /// `check` reads one status snapshot for a given job id. Each job gets
    /// an independent poller with the shared settings; one job failing or
    /// timing out does not affect the others. Panicked tasks are logged
    /// and their results dropped.
    pub async fn poll_all<C, Fut>(
        &self,
        job_ids: Vec<String>,
        check: C,
    ) -> Vec<(String, Result<JobSnapshot>)>
    where
        C: Fn(String) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobSnapshot>> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(job_ids.len());

        for job_id in job_ids {
            let semaphore = Arc::clone(&self.semaphore);
            let check = check.clone();
            let settings = self.settings;

            let handle = tokio::spawn(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => poll_job(&job_id, || check(job_id.clone()), settings).await,
                    Err(_) => Err(FlowgateError::Internal("semaphore closed".to_string())),
                };
                (job_id, result)
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => results.push(pair),
                Err(e) => {
                    warn!(error = %e, "Poll task panicked");
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Per-job countdown: reports pending until the scripted number of
    /// checks has been made, then the scripted terminal status.
    struct Remote {
        countdowns: Mutex<HashMap<String, u32>>,
        terminal: HashMap<String, JobStatus>,
        checks: AtomicU32,
    }

    impl Remote {
        fn check(&self, job_id: &str) -> Result<JobSnapshot> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            let mut countdowns = self.countdowns.lock().unwrap();
            let left = countdowns.get_mut(job_id).unwrap();
            if *left > 0 {
                *left -= 1;
                return Ok(JobSnapshot::new(job_id, JobStatus::Pending));
            }
            match self.terminal.get(job_id).unwrap() {
                JobStatus::Failed => {
                    Ok(JobSnapshot::new(job_id, JobStatus::Failed).with_error("boom"))
                }
                status => Ok(JobSnapshot::new(job_id, status.clone()).with_output(job_id)),
            }
        }
    }

    fn settings() -> PollSettings {
        PollSettings::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_polls_to_independent_outcomes() {
        let remote = Arc::new(Remote {
            countdowns: Mutex::new(HashMap::from([
                ("job-a".to_string(), 0),
                ("job-b".to_string(), 2),
                ("job-c".to_string(), 1),
            ])),
            terminal: HashMap::from([
                ("job-a".to_string(), JobStatus::Completed),
                ("job-b".to_string(), JobStatus::Completed),
                ("job-c".to_string(), JobStatus::Failed),
            ]),
            checks: AtomicU32::new(0),
        });

        let poller = BatchPoller::new(2, settings());
        let check = {
            let remote = Arc::clone(&remote);
            move |id: String| {
                let remote = Arc::clone(&remote);
                async move { remote.check(&id) }
            }
        };

        let mut results = poller
            .poll_all(
                vec!["job-a".to_string(), "job-b".to_string(), "job-c".to_string()],
                check,
            )
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(results.len(), 3);

        let (id, outcome) = &results[0];
        assert_eq!(id, "job-a");
        assert_eq!(outcome.as_ref().unwrap().output.as_deref(), Some("job-a"));

        let (id, outcome) = &results[1];
        assert_eq!(id, "job-b");
        assert_eq!(outcome.as_ref().unwrap().status, JobStatus::Completed);

        let (id, outcome) = &results[2];
        assert_eq!(id, "job-c");
        assert!(matches!(
            outcome.as_ref().unwrap_err(),
            FlowgateError::JobFailed { .. }
        ));

        // job-a: 1 check, job-b: 3, job-c: 2 (failure surfaces on check 2)
        assert_eq!(remote.checks.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_is_empty() {
        let poller = BatchPoller::new(4, settings());
        let results = poller
            .poll_all(Vec::new(), |id: String| async move {
                Ok(JobSnapshot::new(id, JobStatus::Completed))
            })
            .await;
        assert!(results.is_empty());
    }
}
