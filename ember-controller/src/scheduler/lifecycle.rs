//! Per-job lifecycle
//!
//! Runs one job through provision, monitor and teardown, strictly in that
//! order. Once an instance exists it is held by an [`InstanceLease`], so that
//! every path out of the lifecycle deletes it: explicitly on the normal
//! paths, and from `Drop` if the task panics or is aborted.

use ember_core::domain::instance::Instance;
use ember_core::domain::job::{Job, JobStatus};
use ember_core::domain::outcome::{ErrorKind, JobOutcome, TerminalStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::TeardownError;
use crate::repository::InstanceRepository;
use crate::scheduler::registry::JobRegistry;
use crate::service::{InstanceProvisioner, LifecycleMonitor, TeardownHandler};

/// Drives single jobs from submission to a terminal status
pub struct JobLifecycle {
    provisioner: InstanceProvisioner,
    monitor: LifecycleMonitor,
    teardown: TeardownHandler,
    registry: Arc<JobRegistry>,
    job_timeout: Duration,
}

impl JobLifecycle {
    pub fn new(
        repository: Arc<dyn InstanceRepository>,
        config: Arc<Config>,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            provisioner: InstanceProvisioner::new(repository.clone(), config.clone()),
            monitor: LifecycleMonitor::new(
                repository.clone(),
                config.poll_interval,
                config.poll_retry_budget,
            ),
            teardown: TeardownHandler::new(repository, config.operation_timeout),
            registry,
            job_timeout: config.job_timeout,
        }
    }

    /// Runs a job to completion
    ///
    /// Cancellation is honored until the monitor returns; teardown always
    /// runs to completion afterwards.
    pub async fn run(&self, mut job: Job, cancel: &CancellationToken) -> JobOutcome {
        info!("Starting job {} ({})", job.id, job.kind);
        self.advance(&mut job, JobStatus::Provisioning);

        let instance = match self.provisioner.provision(&job).await {
            Ok(instance) => instance,
            Err(e) => {
                error!("Provisioning failed for job {}: {}", job.id, e);
                self.finish(
                    &mut job,
                    TerminalStatus::failed(ErrorKind::Provision, e.to_string()),
                );
                return JobOutcome {
                    job,
                    instance_name: None,
                    teardown_error: None,
                };
            }
        };

        let lease = InstanceLease::new(instance, self.teardown.clone());
        self.advance(&mut job, JobStatus::Running);

        let status = match self
            .monitor
            .await_completion(&job, lease.instance(), self.job_timeout, cancel)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!("Lost track of job {}: {}", job.id, e);
                TerminalStatus::failed(ErrorKind::Monitor, e.to_string())
            }
        };

        let (instance, teardown) = lease.release().await;
        let teardown_error = teardown.err().map(|e| {
            error!(
                "Instance {} of job {} may still be running: {}",
                instance.name, job.id, e
            );
            e.to_string()
        });

        self.finish(&mut job, status);

        JobOutcome {
            job,
            instance_name: Some(instance.name),
            teardown_error,
        }
    }

    /// Terminal outcome for a job cancelled before it was started
    pub fn cancel_pending(&self, mut job: Job) -> JobOutcome {
        info!("Job {} cancelled before it started", job.id);
        self.finish(
            &mut job,
            TerminalStatus::failed(ErrorKind::Cancelled, "job was cancelled before it started"),
        );
        JobOutcome {
            job,
            instance_name: None,
            teardown_error: None,
        }
    }

    fn advance(&self, job: &mut Job, next: JobStatus) {
        match job.advance(next) {
            Ok(()) => {
                info!("Job {} is {}", job.id, next);
                self.registry.record(job);
            }
            Err(e) => warn!("Job {}: {}", job.id, e),
        }
    }

    fn finish(&self, job: &mut Job, status: TerminalStatus) {
        let result = match status {
            TerminalStatus::Succeeded => job.succeed(),
            TerminalStatus::Preempted => job.preempt(),
            TerminalStatus::Failed {
                kind,
                message,
                exit_code,
            } => job.fail(kind, message, exit_code),
        };

        match result {
            Ok(()) => {
                info!(
                    "Job {} finished as {} (exit code {:?})",
                    job.id, job.status, job.exit_code
                );
                self.registry.record(job);
            }
            Err(e) => warn!("Job {}: {}", job.id, e),
        }
    }
}

/// Scoped ownership of a created instance
///
/// Must be consumed with [`InstanceLease::release`]. A lease dropped while
/// still holding its instance schedules a background deletion.
pub struct InstanceLease {
    instance: Instance,
    teardown: TeardownHandler,
    released: bool,
}

impl InstanceLease {
    pub fn new(instance: Instance, teardown: TeardownHandler) -> Self {
        Self {
            instance,
            teardown,
            released: false,
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Deletes the instance and hands back its final record
    pub async fn release(mut self) -> (Instance, Result<(), TeardownError>) {
        let mut instance = self.instance.clone();
        let result = self.teardown.teardown(&mut instance).await;
        self.released = true;
        (instance, result)
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let name = self.instance.name.clone();
        match Handle::try_current() {
            Ok(handle) => {
                warn!("Lease on instance {} dropped, deleting in background", name);
                let teardown = self.teardown.clone();
                handle.spawn(async move {
                    if let Err(e) = teardown.delete(&name).await {
                        error!("Background deletion of {} failed: {}", name, e);
                    }
                });
            }
            Err(_) => error!("Instance {} leaked: no runtime left to delete it", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ProviderState;
    use crate::repository::fake::FakeInstanceRepository;
    use ember_core::domain::job::TaskKind;
    use ember_core::domain::outcome::{
        EXIT_CANCELLED, EXIT_MONITOR, EXIT_PREEMPTED, EXIT_PROVISION, EXIT_TEARDOWN, EXIT_TIMEOUT,
    };
    use ember_core::dto::job::SubmitJob;

    fn config() -> Config {
        let mut config = Config::new("proj".to_string());
        config.poll_interval = Duration::from_secs(10);
        config.job_timeout = Duration::from_secs(600);
        config
    }

    fn lifecycle(repo: &Arc<FakeInstanceRepository>) -> (JobLifecycle, Arc<JobRegistry>) {
        let registry = Arc::new(JobRegistry::new());
        let lifecycle = JobLifecycle::new(repo.clone(), Arc::new(config()), registry.clone());
        (lifecycle, registry)
    }

    fn analysis_job() -> Job {
        SubmitJob {
            kind: TaskKind::Analysis,
            input_uri: "gs://videos/match.mp4".to_string(),
            output_uri: "gs://results/match/".to_string(),
            rallies_uri: None,
            docker_image: "gcr.io/proj/analysis:1.4".to_string(),
        }
        .into_job()
    }

    async fn run(repo: &Arc<FakeInstanceRepository>, cancel: &CancellationToken) -> JobOutcome {
        let (lifecycle, _) = lifecycle(repo);
        lifecycle.run(analysis_job(), cancel).await
    }

    fn assert_single_instance_deleted_once(repo: &FakeInstanceRepository, outcome: &JobOutcome) {
        let name = outcome.instance_name.as_deref().unwrap();
        assert_eq!(repo.create_count(), 1);
        assert_eq!(repo.delete_count(name), 1);
        assert_eq!(repo.total_deletes(), 1);
        assert_eq!(repo.live_instances(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_path() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.marker_after(2, "0");

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.job.status, JobStatus::Succeeded);
        assert_eq!(outcome.job.exit_code, Some(0));
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.job.completed_at.is_some());
        assert_single_instance_deleted_once(&repo, &outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_failure_keeps_exit_code() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.marker_after(1, "17");

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert_eq!(outcome.job.exit_code, Some(17));
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Payload));
        assert_eq!(outcome.exit_code(), 17);
        assert_single_instance_deleted_once(&repo, &outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_still_tears_down() {
        let repo = Arc::new(FakeInstanceRepository::new());

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(outcome.exit_code(), EXIT_TIMEOUT);
        assert_single_instance_deleted_once(&repo, &outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preempted_with_success_marker() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.script_states(&[ProviderState::Preempted]);
        repo.marker_after(0, "0");

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.job.status, JobStatus::Preempted);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Preemption));
        assert_eq!(outcome.exit_code(), EXIT_PREEMPTED);
        assert_single_instance_deleted_once(&repo, &outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_poll() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.delay_polls(Duration::from_secs(300));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let outcome = run(&repo, &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
        assert_eq!(outcome.exit_code(), EXIT_CANCELLED);
        assert_single_instance_deleted_once(&repo, &outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_error_tears_down() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.fail_polls(&[403]);

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Monitor));
        assert_eq!(outcome.exit_code(), EXIT_MONITOR);
        assert_single_instance_deleted_once(&repo, &outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_error_skips_teardown() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.fail_create(&[403]);

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Provision));
        assert_eq!(outcome.exit_code(), EXIT_PROVISION);
        assert!(outcome.instance_name.is_none());
        assert_eq!(repo.total_deletes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_creation_leaves_no_instance() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.delay_insert_wait(Duration::from_secs(3600));

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Provision));
        assert_eq!(outcome.exit_code(), EXIT_PROVISION);
        assert_eq!(repo.create_count(), 1);
        assert_eq!(repo.total_deletes(), 1);
        assert_eq!(repo.live_instances(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_failure_is_secondary() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.marker_after(0, "0");
        repo.fail_delete(&[500]);

        let outcome = run(&repo, &CancellationToken::new()).await;

        assert_eq!(outcome.job.status, JobStatus::Succeeded);
        assert!(outcome.teardown_error.is_some());
        assert_eq!(outcome.exit_code(), EXIT_TEARDOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_retains_terminal_record() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.marker_after(0, "0");
        let (lifecycle, registry) = lifecycle(&repo);
        let job = analysis_job();
        let id = job.id;

        lifecycle.run(job, &CancellationToken::new()).await;

        let record = registry.get(id).unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_lease_deletes_in_background() {
        let repo = Arc::new(FakeInstanceRepository::new());
        let job = analysis_job();
        let name = Instance::name_for(job.id);
        repo.add_live(&name);

        let teardown = TeardownHandler::new(repo.clone(), Duration::from_secs(120));
        let instance = Instance {
            name: name.clone(),
            job_id: job.id,
            zone: "us-east1-c".to_string(),
            machine_type: "n1-standard-4".to_string(),
            image_family: "ember-worker".to_string(),
            created_at: chrono::Utc::now(),
            deleted_at: None,
        };
        drop(InstanceLease::new(instance, teardown));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(repo.delete_count(&name), 1);
        assert_eq!(repo.live_instances(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_lease_deletes_once() {
        let repo = Arc::new(FakeInstanceRepository::new());
        let job = analysis_job();
        let name = Instance::name_for(job.id);
        repo.add_live(&name);

        let teardown = TeardownHandler::new(repo.clone(), Duration::from_secs(120));
        let instance = Instance {
            name: name.clone(),
            job_id: job.id,
            zone: "us-east1-c".to_string(),
            machine_type: "n1-standard-4".to_string(),
            image_family: "ember-worker".to_string(),
            created_at: chrono::Utc::now(),
            deleted_at: None,
        };
        let (instance, result) = InstanceLease::new(instance, teardown).release().await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(result.is_ok());
        assert!(instance.is_deleted());
        assert_eq!(repo.delete_count(&name), 1);
    }
}
