//! Job poller: turn a remote job's asynchronous lifecycle into a
//! synchronous result.
//!
//! One status check runs immediately; while the job is non-terminal the
//! poller sleeps for the configured interval and checks again, charging
//! elapsed wall-clock time against a single deadline. Transient check
//! failures are retried on the next tick and never reset the clock. Both
//! service clients wait on their jobs through this one loop instead of
//! carrying their own sleep-and-retry copies.

use crate::models::{FlowgateError, JobSnapshot, JobStatus, PollConfig, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Polling parameters: how often to check and how long to wait overall.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Wait between successive status checks.
    pub interval: Duration,
    /// Maximum wall-clock time before giving up.
    pub deadline: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            deadline: Duration::from_secs(config.deadline_secs),
        }
    }

    /// Reject unusable parameters before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(FlowgateError::InvalidInput(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.deadline.is_zero() {
            return Err(FlowgateError::InvalidInput(
                "poll deadline must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Poll a remote job until it reaches a terminal status or the deadline
/// passes.
///
/// `check` reads one status snapshot and may fail transiently; transient
/// failures are logged and retried on the next tick, still bounded by the
/// deadline. Outcomes:
/// - `Completed` → the snapshot (with its output payload);
/// - `Failed` → [`FlowgateError::JobFailed`] immediately, even with time
///   remaining;
/// - deadline exceeded first → [`FlowgateError::DeadlineExceeded`].
///
/// A deadline shorter than one interval still gets exactly one check, and
/// the timeout is reported no earlier than the deadline. Dropping the
/// returned future stops future checks; the remote job is unaffected.
pub async fn poll_job<F, Fut>(job_id: &str, check: F, settings: PollSettings) -> Result<JobSnapshot>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<JobSnapshot>>,
{
    settings.validate()?;

    let start = Instant::now();
    let mut checks: u32 = 0;
    let mut transient_failures: u32 = 0;

    loop {
        checks += 1;
        match check().await {
            Ok(snapshot) => match &snapshot.status {
                JobStatus::Completed => {
                    info!(
                        job_id = %job_id,
                        checks = checks,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "Job completed"
                    );
                    return Ok(snapshot);
                }
                JobStatus::Failed => {
                    return Err(FlowgateError::JobFailed {
                        job_id: job_id.to_string(),
                        reason: snapshot.failure_reason(),
                    });
                }
                status => {
                    debug!(job_id = %job_id, status = %status, "Job not finished");
                }
            },
            Err(e) if e.is_retryable() => {
                // The clock keeps running; a flaky check does not extend
                // the deadline.
                transient_failures += 1;
                warn!(
                    job_id = %job_id,
                    error = %e,
                    transient_failures = transient_failures,
                    "Status check failed, will retry on next tick"
                );
            }
            Err(e) => return Err(e),
        }

        let elapsed = start.elapsed();
        if elapsed >= settings.deadline {
            return Err(FlowgateError::DeadlineExceeded {
                job_id: job_id.to_string(),
                waited: elapsed,
                checks,
            });
        }

        // Never sleep past the deadline: a sub-interval remainder wakes us
        // exactly at the deadline to report timeout without another check.
        let remaining = settings.deadline - elapsed;
        tokio::time::sleep(settings.interval.min(remaining)).await;

        if start.elapsed() >= settings.deadline {
            return Err(FlowgateError::DeadlineExceeded {
                job_id: job_id.to_string(),
                waited: start.elapsed(),
                checks,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// A scripted status check: pops one step per call and counts calls.
    struct Script {
        steps: Mutex<VecDeque<Result<JobSnapshot>>>,
        calls: AtomicU32,
    }

    impl Script {
        fn new(steps: Vec<Result<JobSnapshot>>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            })
        }

        async fn check(&self) -> Result<JobSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(JobSnapshot::new("job-1", JobStatus::Pending)))
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn pending() -> Result<JobSnapshot> {
        Ok(JobSnapshot::new("job-1", JobStatus::Pending))
    }

    fn completed(output: &str) -> Result<JobSnapshot> {
        Ok(JobSnapshot::new("job-1", JobStatus::Completed).with_output(output))
    }

    fn failed(reason: &str) -> Result<JobSnapshot> {
        Ok(JobSnapshot::new("job-1", JobStatus::Failed).with_error(reason))
    }

    fn transient() -> Result<JobSnapshot> {
        Err(FlowgateError::Api {
            status: 503,
            message: "unavailable".to_string(),
        })
    }

    fn settings(interval_secs: u64, deadline_secs: u64) -> PollSettings {
        PollSettings::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(deadline_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_on_first_check_does_not_sleep() {
        let script = Script::new(vec![completed("OK")]);
        let start = Instant::now();

        let snapshot = poll_job("job-1", || script.check(), settings(3, 10))
            .await
            .unwrap();

        assert_eq!(snapshot.output.as_deref(), Some("OK"));
        assert_eq!(script.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_completed_at_expected_elapsed() {
        // interval 3, deadline 10, statuses [pending, pending, completed]
        // checked at t = 0, 3, 6.
        let script = Script::new(vec![pending(), pending(), completed("OK")]);
        let start = Instant::now();

        let snapshot = poll_job("job-1", || script.check(), settings(3, 10))
            .await
            .unwrap();

        assert_eq!(snapshot.output.as_deref(), Some("OK"));
        assert_eq!(script.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_shorter_than_interval_gets_one_check() {
        // interval 5, deadline 4: one check at t=0, timeout at t>=4.
        let script = Script::new(vec![pending()]);
        let start = Instant::now();

        let err = poll_job("job-1", || script.check(), settings(5, 4))
            .await
            .unwrap_err();

        assert_eq!(script.calls(), 1);
        assert!(start.elapsed() >= Duration::from_secs(4));
        match err {
            FlowgateError::DeadlineExceeded { checks, waited, .. } => {
                assert_eq!(checks, 1);
                assert!(waited >= Duration::from_secs(4));
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_is_immediate_never_timeout() {
        let script = Script::new(vec![pending(), failed("out of memory")]);

        let err = poll_job("job-1", || script.check(), settings(3, 300))
            .await
            .unwrap_err();

        match err {
            FlowgateError::JobFailed { job_id, reason } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(reason, "out of memory");
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_become_timeout_not_transport_error() {
        // Every check fails transiently; once the deadline passes the
        // reported outcome is the timeout, not the transport error.
        let script = Script::new(vec![transient(), transient(), transient(), transient()]);

        let err = poll_job("job-1", || script.check(), settings(2, 5))
            .await
            .unwrap_err();

        match err {
            FlowgateError::DeadlineExceeded { checks, .. } => assert_eq!(checks, 3),
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_does_not_reset_clock() {
        // interval 3, deadline 10: checks at 0, 3, 6 (transient), 9 — the
        // failure at t=6 must not extend the deadline past t=10.
        let script = Script::new(vec![pending(), pending(), transient(), pending()]);
        let start = Instant::now();

        let err = poll_job("job-1", || script.check(), settings(3, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowgateError::DeadlineExceeded { .. }));
        assert_eq!(script.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_check_error_aborts_poll() {
        let script = Script::new(vec![Err(FlowgateError::AuthenticationFailed)]);

        let err = poll_job("job-1", || script.check(), settings(3, 30))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowgateError::AuthenticationFailed));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_status_keeps_polling() {
        let script = Script::new(vec![
            Ok(JobSnapshot::new("job-1", JobStatus::Other("finalizing".to_string()))),
            completed("OK"),
        ]);

        let snapshot = poll_job("job-1", || script.check(), settings(1, 10))
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_deadline_rejected_before_any_check() {
        let script = Script::new(vec![pending()]);

        let err = poll_job("job-1", || script.check(), settings(3, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowgateError::InvalidInput(_)));
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected_before_any_check() {
        let script = Script::new(vec![pending()]);

        let err = poll_job("job-1", || script.check(), settings(0, 10))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowgateError::InvalidInput(_)));
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_snapshot_is_stable_on_reread() {
        // A terminal remote job returns the same snapshot on every read;
        // two sequential polls observe the same outcome.
        let script = Script::new(vec![completed("done"), completed("done")]);

        let first = poll_job("job-1", || script.check(), settings(3, 10))
            .await
            .unwrap();
        let second = poll_job("job-1", || script.check(), settings(3, 10))
            .await
            .unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.output, second.output);
    }
}
