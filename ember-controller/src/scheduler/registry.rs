//! Process-wide job registry
//!
//! Keeps the latest record of every submitted job, terminal ones included,
//! for reporting. Nothing in the lifecycle reads it back to make decisions.

use ember_core::domain::job::{Job, JobStatus};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Counts of jobs per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySummary {
    pub pending: usize,
    pub provisioning: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub preempted: usize,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the latest state of a job
    pub fn record(&self, job: &Job) {
        self.lock().insert(job.id, job.clone());
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.lock().get(&id).cloned()
    }

    /// Jobs that have not reached a terminal status
    pub fn in_flight(&self) -> usize {
        self.lock()
            .values()
            .filter(|job| !job.status.is_terminal())
            .count()
    }

    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary::default();
        for job in self.lock().values() {
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Provisioning => summary.provisioning += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Preempted => summary.preempted += 1,
            }
        }
        summary
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
