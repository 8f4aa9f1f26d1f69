//! Terminal outcomes and the error taxonomy

use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobStatus};

/// Exit code reserved for a rejected instance creation
pub const EXIT_PROVISION: i32 = 100;
/// Exit code reserved for a monitor that could not observe the job
pub const EXIT_MONITOR: i32 = 101;
/// Exit code reserved for a job that produced no terminal signal in time
pub const EXIT_TIMEOUT: i32 = 102;
/// Exit code reserved for a succeeded job whose instance could not be deleted
pub const EXIT_TEARDOWN: i32 = 103;
/// Exit code reserved for a preempted job
pub const EXIT_PREEMPTED: i32 = 104;
/// Exit code reserved for a cancelled job
pub const EXIT_CANCELLED: i32 = 105;

/// Which part of the system a failure belongs to
///
/// `Payload` is the only kind caused by the container itself; every other
/// kind is infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Provision,
    Monitor,
    Timeout,
    Payload,
    Preemption,
    Teardown,
    Cancelled,
}

impl ErrorKind {
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, ErrorKind::Payload | ErrorKind::Cancelled)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Provision => "ProvisionError",
            ErrorKind::Monitor => "MonitorError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Payload => "PayloadError",
            ErrorKind::Preemption => "PreemptionError",
            ErrorKind::Teardown => "TeardownError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Why a job did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Status reported by the lifecycle monitor once the job has ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    Succeeded,
    Failed {
        kind: ErrorKind,
        message: String,
        exit_code: Option<i32>,
    },
    Preempted,
}

impl TerminalStatus {
    pub fn payload_failure(exit_code: i32) -> Self {
        TerminalStatus::Failed {
            kind: ErrorKind::Payload,
            message: format!("container exited with code {}", exit_code),
            exit_code: Some(exit_code),
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        TerminalStatus::Failed {
            kind,
            message: message.into(),
            exit_code: None,
        }
    }

    /// Maps a completion marker's exit code to a terminal status
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            TerminalStatus::Succeeded
        } else {
            Self::payload_failure(exit_code)
        }
    }
}

/// Final result handed back to the caller of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// The retained job record in its terminal state
    pub job: Job,
    /// Name of the instance the job ran on, if one was created
    pub instance_name: Option<String>,
    /// Secondary failure to delete the instance
    ///
    /// Never overrides the job status; signals a possibly leaked VM.
    pub teardown_error: Option<String>,
}

impl JobOutcome {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.job.failure.as_ref().map(|f| f.kind)
    }

    pub fn succeeded(&self) -> bool {
        self.job.status == JobStatus::Succeeded
    }

    /// Process exit code for a CLI boundary
    ///
    /// 0 on success, the container's code for payload failures and the
    /// reserved 100+ range for controller-level errors.
    pub fn exit_code(&self) -> i32 {
        match self.job.status {
            JobStatus::Succeeded if self.teardown_error.is_some() => EXIT_TEARDOWN,
            JobStatus::Succeeded => 0,
            JobStatus::Preempted => EXIT_PREEMPTED,
            _ => match self.error_kind() {
                Some(ErrorKind::Payload) => self.job.exit_code.unwrap_or(1),
                Some(ErrorKind::Provision) => EXIT_PROVISION,
                Some(ErrorKind::Monitor) => EXIT_MONITOR,
                Some(ErrorKind::Timeout) => EXIT_TIMEOUT,
                Some(ErrorKind::Teardown) => EXIT_TEARDOWN,
                Some(ErrorKind::Preemption) => EXIT_PREEMPTED,
                Some(ErrorKind::Cancelled) => EXIT_CANCELLED,
                None => EXIT_MONITOR,
            },
        }
    }
}
