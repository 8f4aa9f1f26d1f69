//! Controller error types
//!
//! Each lifecycle stage has its own error so that callers can tell which
//! stage gave up. Job-level failures (payload exit codes, preemption,
//! timeouts, cancellation) are not errors here: they are terminal statuses.

use ember_compute::ComputeError;
use ember_core::dto::job::ValidationError;
use std::time::Duration;
use thiserror::Error;

/// Instance creation was refused or could not be confirmed
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid job: {0}")]
    InvalidJob(#[from] ValidationError),

    #[error("refusing to create more than {limit} managed instances")]
    TooManyInstances { limit: usize },

    #[error("zone has no capacity for the instance: {0}")]
    ResourcesExhausted(String),

    #[error("instance creation rejected: {0}")]
    Rejected(#[source] ComputeError),

    #[error("instance creation not acknowledged within {0:?}")]
    TimedOut(Duration),
}

impl From<ComputeError> for ProvisionError {
    fn from(err: ComputeError) -> Self {
        match err {
            ComputeError::ResourcesExhausted(msg) => ProvisionError::ResourcesExhausted(msg),
            other => ProvisionError::Rejected(other),
        }
    }
}

/// The monitor could not observe the job
///
/// Distinct from a job failure: the payload may still be running.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("polling failed after {attempts} attempt(s): {source}")]
    PollFailed {
        attempts: u32,
        #[source]
        source: ComputeError,
    },

    #[error("instance {0} is gone without a completion marker")]
    InstanceLost(String),

    #[error("invalid completion marker '{0}'")]
    InvalidMarker(String),
}

/// Instance deletion was rejected
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("deletion of {instance} rejected: {source}")]
    Rejected {
        instance: String,
        #[source]
        source: ComputeError,
    },

    #[error("deletion of {instance} not acknowledged within {timeout:?}")]
    TimedOut { instance: String, timeout: Duration },
}
