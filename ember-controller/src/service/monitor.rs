//! Lifecycle monitor
//!
//! Watches a running job until it reaches a terminal state. Every poll
//! reconciles two sources in a fixed order:
//! 1. Provider state, so that a preemption wins over anything else
//! 2. The completion marker published by the startup script
//!
//! The job timeout and cancellation are observed between and during polls.

use ember_compute::ComputeError;
use ember_core::domain::instance::Instance;
use ember_core::domain::job::Job;
use ember_core::domain::outcome::{ErrorKind, TerminalStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MonitorError;
use crate::repository::{InstanceRepository, ProviderState};
use crate::retry::{Backoff, RetryError, retry};
use crate::service::deadline_after;

/// Polls provider state and the completion marker of running jobs
pub struct LifecycleMonitor {
    repository: Arc<dyn InstanceRepository>,
    poll_interval: Duration,
    backoff: Backoff,
}

impl LifecycleMonitor {
    /// Creates a new monitor
    ///
    /// # Arguments
    /// * `poll_interval` - Fixed delay between two polls
    /// * `retry_budget` - Transient failures tolerated within a single poll
    pub fn new(
        repository: Arc<dyn InstanceRepository>,
        poll_interval: Duration,
        retry_budget: u32,
    ) -> Self {
        Self {
            repository,
            poll_interval,
            backoff: Backoff::new(retry_budget.saturating_add(1)),
        }
    }

    /// Waits until the job on `instance` ends
    ///
    /// # Returns
    /// The terminal status, including timeouts and cancellations. An error
    /// means the job could not be observed, not that it failed.
    pub async fn await_completion(
        &self,
        job: &Job,
        instance: &Instance,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TerminalStatus, MonitorError> {
        let deadline = deadline_after(timeout);
        let mut polls: u64 = 0;

        info!(
            "Monitoring job {} on {} (timeout {:?})",
            job.id, instance.name, timeout
        );

        loop {
            polls += 1;

            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(job)),
                _ = tokio::time::sleep_until(deadline) => return Ok(timed_out(job, timeout)),
                result = self.poll(instance) => result?,
            };

            if let Some(status) = observed {
                info!(
                    "Job {} reached {:?} after {} poll(s)",
                    job.id, status, polls
                );
                return Ok(status);
            }

            debug!("Job {} still running (poll {})", job.id, polls);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(job)),
                _ = tokio::time::sleep_until(deadline) => return Ok(timed_out(job, timeout)),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Performs one reconciliation, `None` while the payload is running
    async fn poll(&self, instance: &Instance) -> Result<Option<TerminalStatus>, MonitorError> {
        let name = instance.name.as_str();

        let state = retry(
            "Reading instance state",
            self.backoff,
            ComputeError::is_transient,
            || self.repository.instance_state(name),
        )
        .await
        .map_err(poll_failed)?;

        if state == ProviderState::Preempted {
            return Ok(Some(TerminalStatus::Preempted));
        }

        let marker = retry(
            "Reading completion marker",
            self.backoff,
            ComputeError::is_transient,
            || self.repository.completion_marker(name),
        )
        .await
        .map_err(poll_failed)?;

        if let Some(raw) = marker {
            let exit_code = parse_marker(&raw)?;
            return Ok(Some(TerminalStatus::from_exit_code(exit_code)));
        }

        match state {
            ProviderState::Active => Ok(None),
            ProviderState::Stopped | ProviderState::Missing => {
                Err(MonitorError::InstanceLost(name.to_string()))
            }
            ProviderState::Preempted => Ok(Some(TerminalStatus::Preempted)),
        }
    }
}

fn poll_failed(err: RetryError<ComputeError>) -> MonitorError {
    MonitorError::PollFailed {
        attempts: err.attempts,
        source: err.error,
    }
}

fn parse_marker(raw: &str) -> Result<i32, MonitorError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| MonitorError::InvalidMarker(raw.to_string()))
}

fn cancelled(job: &Job) -> TerminalStatus {
    info!("Monitoring of job {} cancelled", job.id);
    TerminalStatus::failed(ErrorKind::Cancelled, "job was cancelled")
}

fn timed_out(job: &Job, timeout: Duration) -> TerminalStatus {
    info!("Job {} timed out after {:?}", job.id, timeout);
    TerminalStatus::failed(
        ErrorKind::Timeout,
        format!("no completion signal within {:?}", timeout),
    )
}
