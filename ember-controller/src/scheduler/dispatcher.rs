//! Job dispatcher
//!
//! Accepts job submissions and runs each one in its own task. A semaphore
//! bounds how many lifecycles are active at once; jobs over the limit wait
//! in `Pending` until a permit frees up.

use ember_core::domain::job::Job;
use ember_core::domain::outcome::JobOutcome;
use ember_core::dto::job::SubmitJob;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::repository::InstanceRepository;
use crate::scheduler::lifecycle::JobLifecycle;
use crate::scheduler::registry::JobRegistry;

type CancelTokens = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

/// Handle on a submitted job
pub struct JobHandle {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Requests cancellation; no effect once the job is tearing down
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the job's terminal outcome
    pub async fn outcome(self) -> Result<JobOutcome, JoinError> {
        self.task.await
    }
}

/// Runs submitted jobs concurrently
pub struct Dispatcher {
    lifecycle: Arc<JobLifecycle>,
    registry: Arc<JobRegistry>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    tokens: CancelTokens,
}

impl Dispatcher {
    /// Creates a new dispatcher
    pub fn new(config: Arc<Config>, repository: Arc<dyn InstanceRepository>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            lifecycle: Arc::new(JobLifecycle::new(repository, config, registry.clone())),
            registry,
            semaphore,
            shutdown: CancellationToken::new(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    /// Submits a job and starts its lifecycle in the background
    ///
    /// The job is validated by the provisioner, so an invalid submission
    /// still yields an outcome (a provisioning failure).
    pub fn submit(&self, request: SubmitJob) -> JobHandle {
        let job = request.into_job();
        let id = job.id;
        let cancel = self.shutdown.child_token();

        self.registry.record(&job);
        lock(&self.tokens).insert(id, cancel.clone());
        info!("Submitted job {} ({})", id, job.kind);

        let task = self.spawn_job_task(job, cancel.clone());

        JobHandle { id, cancel, task }
    }

    /// Cancels one job, returns false if it is unknown or already finished
    pub fn cancel(&self, id: Uuid) -> bool {
        match lock(&self.tokens).get(&id) {
            Some(token) => {
                info!("Cancelling job {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every job, running or waiting for a permit
    pub fn cancel_all(&self) {
        info!("Cancelling all jobs ({} in flight)", self.registry.in_flight());
        self.shutdown.cancel();
    }

    /// Spawns a task to run a single job
    fn spawn_job_task(&self, job: Job, cancel: CancellationToken) -> JoinHandle<JobOutcome> {
        let lifecycle = Arc::clone(&self.lifecycle);
        let semaphore = Arc::clone(&self.semaphore);
        let tokens = Arc::clone(&self.tokens);

        tokio::spawn(async move {
            let id = job.id;

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };

            let outcome = match permit {
                // Permit is released when dropped at the end of this arm
                Some(_permit) => {
                    debug!("Job {} acquired a slot", id);
                    lifecycle.run(job, &cancel).await
                }
                None => lifecycle.cancel_pending(job),
            };

            lock(&tokens).remove(&id);
            outcome
        })
    }
}

fn lock(tokens: &CancelTokens) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
    tokens.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fake::FakeInstanceRepository;
    use ember_core::domain::job::{JobStatus, TaskKind};
    use ember_core::domain::outcome::ErrorKind;
    use std::collections::HashSet;
    use std::time::Duration;

    fn config(max_parallel_jobs: usize) -> Arc<Config> {
        let mut config = Config::new("proj".to_string());
        config.poll_interval = Duration::from_secs(10);
        config.job_timeout = Duration::from_secs(600);
        config.max_parallel_jobs = max_parallel_jobs;
        Arc::new(config)
    }

    fn request(n: usize) -> SubmitJob {
        SubmitJob {
            kind: TaskKind::Analysis,
            input_uri: format!("gs://videos/match-{}.mp4", n),
            output_uri: format!("gs://results/match-{}/", n),
            rallies_uri: None,
            docker_image: "gcr.io/proj/analysis:1.4".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_jobs_are_independent() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.marker_after(0, "0");
        let dispatcher = Dispatcher::new(config(4), repo.clone());

        let handles: Vec<JobHandle> = (0..4).map(|n| dispatcher.submit(request(n))).collect();
        let ids: HashSet<Uuid> = handles.iter().map(JobHandle::id).collect();

        let mut names = HashSet::new();
        for handle in handles {
            let outcome = handle.outcome().await.unwrap();
            assert_eq!(outcome.job.status, JobStatus::Succeeded);
            names.insert(outcome.instance_name.unwrap());
        }

        assert_eq!(ids.len(), 4);
        assert_eq!(names.len(), 4);
        assert_eq!(repo.create_count(), 4);
        for name in &names {
            assert_eq!(repo.delete_count(name), 1);
        }
        assert_eq!(dispatcher.registry().summary().succeeded, 4);
        assert_eq!(dispatcher.registry().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallelism_is_bounded() {
        let repo = Arc::new(FakeInstanceRepository::new());
        repo.marker_after(0, "0");
        repo.delay_polls(Duration::from_secs(30));
        let dispatcher = Dispatcher::new(config(1), repo.clone());

        let first = dispatcher.submit(request(1));
        let second = dispatcher.submit(request(2));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(repo.create_count(), 1);
        assert_eq!(dispatcher.registry().summary().pending, 1);

        first.outcome().await.unwrap();
        second.outcome().await.unwrap();
        assert_eq!(repo.create_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_one_job() {
        let repo = Arc::new(FakeInstanceRepository::new());
        let dispatcher = Dispatcher::new(config(4), repo.clone());

        let cancelled = dispatcher.submit(request(1));
        let other = dispatcher.submit(request(2));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(dispatcher.cancel(cancelled.id()));

        let outcome = cancelled.outcome().await.unwrap();
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));

        let other = other.outcome().await.unwrap();
        assert_eq!(other.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(repo.total_deletes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_includes_waiting_jobs() {
        let repo = Arc::new(FakeInstanceRepository::new());
        let dispatcher = Dispatcher::new(config(1), repo.clone());

        let running = dispatcher.submit(request(1));
        let waiting = dispatcher.submit(request(2));

        tokio::time::sleep(Duration::from_secs(1)).await;
        dispatcher.cancel_all();

        let running = running.outcome().await.unwrap();
        let waiting = waiting.outcome().await.unwrap();

        assert_eq!(running.error_kind(), Some(ErrorKind::Cancelled));
        assert!(running.instance_name.is_some());
        assert_eq!(waiting.error_kind(), Some(ErrorKind::Cancelled));
        assert!(waiting.instance_name.is_none());
        assert_eq!(repo.create_count(), 1);
        assert_eq!(repo.total_deletes(), 1);
        assert!(!dispatcher.cancel(running.job.id));
    }
}
