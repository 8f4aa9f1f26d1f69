//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::outcome::{ErrorKind, JobFailure};

/// One unit of work: a containerized payload run on its own instance.
///
/// The record is retained after teardown for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: TaskKind,
    pub input_uri: String,
    pub output_uri: String,
    /// Only meaningful for `TaskKind::Analysis`
    pub rallies_uri: Option<String>,
    pub docker_image: String,
    pub status: JobStatus,
    /// Set when the job reaches a terminal state with a known container exit code
    pub exit_code: Option<i32>,
    pub failure: Option<JobFailure>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Kind of payload a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Analysis,
    Export,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Analysis => "analysis",
            TaskKind::Export => "export",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status
///
/// Statuses are ordered; a job only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Provisioning,
    Running,
    Succeeded,
    Failed,
    Preempted,
}

impl JobStatus {
    /// Whether this status ends the job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Preempted
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Provisioning => 1,
            JobStatus::Running => 2,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Preempted => 3,
        }
    }

    /// Checks whether moving from `self` to `next` is a forward transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    /// Moves the job to a non-terminal status
    pub fn advance(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) || next.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Marks the job succeeded with exit code 0
    pub fn succeed(&mut self) -> Result<(), TransitionError> {
        self.finish(JobStatus::Succeeded, Some(0), None)
    }

    /// Marks the job failed
    ///
    /// `exit_code` is only known for payload failures.
    pub fn fail(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Result<(), TransitionError> {
        self.finish(
            JobStatus::Failed,
            exit_code,
            Some(JobFailure::new(kind, message)),
        )
    }

    /// Marks the job preempted by the provider
    pub fn preempt(&mut self) -> Result<(), TransitionError> {
        self.finish(
            JobStatus::Preempted,
            None,
            Some(JobFailure::new(
                ErrorKind::Preemption,
                "instance was reclaimed by the provider",
            )),
        )
    }

    fn finish(
        &mut self,
        status: JobStatus,
        exit_code: Option<i32>,
        failure: Option<JobFailure>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(status) {
            return Err(TransitionError {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.exit_code = exit_code;
        self.failure = failure;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
